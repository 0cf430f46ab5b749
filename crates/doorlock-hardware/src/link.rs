//! Serial transport for the relay board.
//!
//! [`RelayLink`] owns the serial port and moves 4-byte frames over it. It knows
//! nothing about what the frames mean; that is [`RelayBoard`](crate::RelayBoard)'s
//! job. Two kinds of operation exist:
//!
//! - [`send`](RelayLink::send): write a frame, do not wait for anything
//! - [`request`](RelayLink::request): write a frame and complete with the next
//!   frame the board sends back, bounded by the response window
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────── RelayLink ─────────────┐
//! request() ──>   │ gate (FIFO mutex)                  │
//!                 │   FramedWrite<RelayCodec> ─────────┼──> serial TX
//!                 │   inbound queue <── reader task <──┼─── serial RX
//!                 │ broadcast<LinkEvent> ──> subscribers
//!                 └────────────────────────────────────┘
//! ```
//!
//! The gate serializes every operation on the link, so at most one request is
//! in flight and callers are served in arrival order. Before a request is
//! written, frames already sitting in the inbound queue are discarded: they
//! are late answers to a timed-out request or answers to a `send`, and must
//! not be mistaken for the answer to this request. After a timeout the next
//! request first waits up to one more response window for the late answer
//! and drops it; an answer later than that is indistinguishable from a fresh
//! one. The board also answers a `send`; the link remembers the echo it owes
//! and absorbs it if it only turns up while a later request is waiting.
//!
//! # Example
//!
//! ```
//! use doorlock_hardware::RelayLink;
//! use doorlock_protocol::{CommandCode, SerialFrame};
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> doorlock_hardware::Result<()> {
//! let (host, board) = tokio::io::duplex(64);
//! let link = RelayLink::new("duplex", Duration::from_millis(50));
//! link.attach(host).await?;
//!
//! // Nobody answers on the other end.
//! let result = link.request(SerialFrame::request(CommandCode::Setup, 0, 0)).await;
//! assert!(result.is_err());
//! # drop(board);
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use doorlock_core::config::RelayConfig;
use doorlock_core::constants::RELAY_BAUD_RATE;
use doorlock_protocol::{CommandCode, RawFrame, RelayCodec, SerialFrame};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, StopBits};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, trace, warn};

use crate::error::{LinkError, Result};

/// Frames buffered between the reader task and the request path.
const INBOUND_QUEUE_CAPACITY: usize = 16;

/// Capacity of the observability channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Marker stored in `live` while no connection is up.
const NO_CONNECTION: u64 = 0;

/// Echoes of unanswered sends remembered per connection.
const MAX_OWED_ECHOES: usize = 8;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Observable events of a relay link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A connection was established.
    Connected,

    /// The connection was closed or lost.
    Disconnected,

    /// A complete 4-byte frame arrived, checksum not yet verified.
    FrameReceived(RawFrame),

    /// A write was attempted; `error` is set if it failed.
    FrameWritten {
        frame: SerialFrame,
        error: Option<String>,
    },
}

/// One open connection.
struct Connection {
    generation: u64,
    writer: FramedWrite<BoxedWriter, RelayCodec>,
    inbound: mpsc::Receiver<RawFrame>,
    reader: JoinHandle<()>,

    /// Echo command bytes still owed for frames written with `send`, oldest
    /// first.
    owed: VecDeque<u8>,

    /// Set when a request timed out: its answer may still be on the way and
    /// is waited for until this instant before the next request is written.
    late_until: Option<Instant>,
}

impl Connection {
    fn discard_stale(&mut self) -> usize {
        let mut discarded = 0;
        while let Ok(raw) = self.inbound.try_recv() {
            trace!(frame = %raw, "Discarding stale frame");
            self.absorb_owed(&raw);
            discarded += 1;
        }
        discarded
    }

    /// Wait for the answer of a timed-out request and drop it.
    ///
    /// The board answers in order, so the first frame that is not an owed
    /// echo is that answer. Returns without waiting if nothing is due.
    async fn settle_late_answer(&mut self) {
        let Some(until) = self.late_until.take() else {
            return;
        };
        loop {
            match timeout_at(until, self.inbound.recv()).await {
                Ok(Some(raw)) => {
                    if self.absorb_owed(&raw) {
                        continue;
                    }
                    debug!(frame = %raw, "Dropped late answer of a timed-out request");
                    return;
                }
                Ok(None) => return,
                Err(_) => {
                    debug!("Answer of a timed-out request never arrived");
                    return;
                }
            }
        }
    }

    fn owe_echo(&mut self, frame: &SerialFrame) {
        if let Some(command) = frame.command_code() {
            if self.owed.len() == MAX_OWED_ECHOES {
                self.owed.pop_front();
            }
            self.owed.push_back(command.expected_echo());
        }
    }

    /// Whether `raw` settles the oldest owed echo.
    fn absorb_owed(&mut self, raw: &RawFrame) -> bool {
        if self.owed.front() == Some(&raw.as_bytes()[0]) {
            self.owed.pop_front();
            return true;
        }
        false
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Frame transport over a serial line.
pub struct RelayLink {
    path: String,
    response_timeout: Duration,

    /// Request gate; holds the connection while one is open.
    gate: Mutex<Option<Connection>>,

    /// Generation of the live connection, or `NO_CONNECTION`.
    live: Arc<AtomicU64>,

    /// Source of connection generations.
    generations: AtomicU64,

    events: broadcast::Sender<LinkEvent>,
}

impl RelayLink {
    /// Create a closed link for the serial device at `path`.
    pub fn new(path: impl Into<String>, response_timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            path: path.into(),
            response_timeout,
            gate: Mutex::new(None),
            live: Arc::new(AtomicU64::new(NO_CONNECTION)),
            generations: AtomicU64::new(NO_CONNECTION + 1),
            events,
        }
    }

    /// Create a closed link from the `[relay]` section.
    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.port.clone(), config.response_timeout())
    }

    /// Device path, or the label given to an attached stream.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// How long a request waits for its answer.
    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    /// Whether a connection is up and its reader has not seen end of stream.
    pub fn is_connected(&self) -> bool {
        self.live.load(Ordering::SeqCst) != NO_CONNECTION
    }

    /// Subscribe to link events.
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    /// Open the serial device at 19200 8N1.
    ///
    /// # Errors
    /// `AlreadyOpen` if a connection is live, `Open` if the device cannot be
    /// opened.
    pub async fn connect(&self) -> Result<()> {
        let mut gate = self.gate.lock().await;
        self.ensure_closed(&mut gate)?;

        let port = tokio_serial::new(&self.path, RELAY_BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .open_native_async()
            .map_err(|e| LinkError::open(&self.path, e))?;

        self.install(&mut gate, port);
        Ok(())
    }

    /// Use an already open byte stream as the link.
    ///
    /// # Errors
    /// `AlreadyOpen` if a connection is live.
    pub async fn attach<T>(&self, io: T) -> Result<()>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let mut gate = self.gate.lock().await;
        self.ensure_closed(&mut gate)?;
        self.install(&mut gate, io);
        Ok(())
    }

    /// Close the connection, if any. Waits for an in-flight request to finish.
    pub async fn disconnect(&self) {
        let mut gate = self.gate.lock().await;
        let Some(mut connection) = gate.take() else {
            return;
        };

        let was_live = self
            .live
            .compare_exchange(
                connection.generation,
                NO_CONNECTION,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();

        connection.reader.abort();
        if let Err(e) = SinkExt::<SerialFrame>::close(&mut connection.writer).await {
            debug!(error = %e, "Error while closing relay link");
        }
        drop(connection);

        if was_live {
            info!(path = %self.path, "Relay link closed");
            let _ = self.events.send(LinkEvent::Disconnected);
        }
    }

    /// Write a frame without waiting for an answer.
    ///
    /// # Errors
    /// `LinkNotOpen`/`Disconnected` without a live connection, `WriteFailure`
    /// if the write fails.
    pub async fn send(&self, frame: SerialFrame) -> Result<()> {
        let mut gate = self.gate.lock().await;
        let connection = match self.live_connection(&mut gate) {
            Ok(connection) => connection,
            Err(e) => {
                self.emit_written(frame, Some(e.to_string()));
                return Err(e);
            }
        };

        self.write(connection, frame).await?;
        connection.owe_echo(&frame);
        Ok(())
    }

    /// Write a frame and wait for the board's next frame.
    ///
    /// # Errors
    /// Everything [`send`](Self::send) returns, plus `Timeout` if nothing
    /// arrives within the response window, `ProtocolMismatch` if the answer
    /// fails its checksum, and `Disconnected` if the link drops while waiting.
    pub async fn request(&self, frame: SerialFrame) -> Result<SerialFrame> {
        let mut gate = self.gate.lock().await;
        let connection = match self.live_connection(&mut gate) {
            Ok(connection) => connection,
            Err(e) => {
                self.emit_written(frame, Some(e.to_string()));
                return Err(e);
            }
        };

        connection.settle_late_answer().await;
        let stale = connection.discard_stale();
        if stale > 0 {
            debug!(stale, "Discarded unsolicited frames before request");
        }

        self.write(connection, frame).await?;

        let deadline = Instant::now() + self.response_timeout;
        let expected = frame.command_code().map(CommandCode::expected_echo);
        loop {
            match timeout_at(deadline, connection.inbound.recv()).await {
                Ok(Some(raw)) => {
                    if expected != Some(raw.as_bytes()[0]) && connection.absorb_owed(&raw) {
                        trace!(frame = %raw, "Absorbed late echo of an earlier send");
                        continue;
                    }
                    let answer = raw.validate().map_err(|e| {
                        warn!(request = %frame, response = %raw, error = %e, "Invalid response frame");
                        LinkError::ProtocolMismatch(e)
                    })?;
                    debug!(request = %frame, response = %answer, "Request answered");
                    return Ok(answer);
                }
                Ok(None) => {
                    warn!(request = %frame, "Relay link dropped while awaiting response");
                    return Err(LinkError::Disconnected);
                }
                Err(_) => {
                    connection.late_until = Some(Instant::now() + self.response_timeout);
                    let duration_ms =
                        u64::try_from(self.response_timeout.as_millis()).unwrap_or(u64::MAX);
                    warn!(request = %frame, timeout_ms = duration_ms, "No response from relay board");
                    return Err(LinkError::timeout(duration_ms));
                }
            }
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.live.load(Ordering::SeqCst) == generation
    }

    fn ensure_closed(&self, slot: &mut Option<Connection>) -> Result<()> {
        if slot
            .as_ref()
            .is_some_and(|connection| self.is_current(connection.generation))
        {
            return Err(LinkError::AlreadyOpen);
        }
        // A connection whose reader saw end of stream is dead; release it.
        *slot = None;
        Ok(())
    }

    fn live_connection<'a>(&self, slot: &'a mut Option<Connection>) -> Result<&'a mut Connection> {
        match slot {
            None => Err(LinkError::LinkNotOpen),
            Some(connection) if self.is_current(connection.generation) => Ok(connection),
            Some(_) => Err(LinkError::Disconnected),
        }
    }

    fn install<T>(&self, slot: &mut Option<Connection>, io: T)
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let generation = self.generations.fetch_add(1, Ordering::SeqCst);
        let (read_half, write_half) = tokio::io::split(io);
        let (inbound_tx, inbound) = mpsc::channel(INBOUND_QUEUE_CAPACITY);

        self.live.store(generation, Ordering::SeqCst);
        let reader = tokio::spawn(read_loop(
            FramedRead::new(read_half, RelayCodec::new()),
            inbound_tx,
            self.events.clone(),
            Arc::clone(&self.live),
            generation,
        ));

        let writer: BoxedWriter = Box::new(write_half);
        *slot = Some(Connection {
            generation,
            writer: FramedWrite::new(writer, RelayCodec::new()),
            inbound,
            reader,
            owed: VecDeque::new(),
            late_until: None,
        });

        info!(path = %self.path, "Relay link connected");
        let _ = self.events.send(LinkEvent::Connected);
    }

    async fn write(&self, connection: &mut Connection, frame: SerialFrame) -> Result<()> {
        trace!(frame = %frame, "Writing frame");
        match connection.writer.send(frame).await {
            Ok(()) => {
                self.emit_written(frame, None);
                Ok(())
            }
            Err(e) => {
                warn!(frame = %frame, error = %e, "Failed to write frame");
                self.emit_written(frame, Some(e.to_string()));
                Err(LinkError::write_failure(e.to_string()))
            }
        }
    }

    fn emit_written(&self, frame: SerialFrame, error: Option<String>) {
        let _ = self.events.send(LinkEvent::FrameWritten { frame, error });
    }
}

impl fmt::Debug for RelayLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayLink")
            .field("path", &self.path)
            .field("response_timeout", &self.response_timeout)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Reader task: decode frames, publish them, queue them for the request path.
async fn read_loop<R>(
    mut frames: FramedRead<R, RelayCodec>,
    inbound: mpsc::Sender<RawFrame>,
    events: broadcast::Sender<LinkEvent>,
    live: Arc<AtomicU64>,
    generation: u64,
) where
    R: AsyncRead + Unpin,
{
    while let Some(item) = frames.next().await {
        match item {
            Ok(raw) => {
                trace!(frame = %raw, "Frame received");
                // Queue before publishing so subscribers never observe a frame
                // the request path cannot see yet.
                match inbound.try_send(raw) {
                    Ok(()) => {}
                    Err(TrySendError::Full(raw)) => {
                        debug!(frame = %raw, "Inbound queue full, dropping frame");
                    }
                    Err(TrySendError::Closed(_)) => return,
                }
                let _ = events.send(LinkEvent::FrameReceived(raw));
            }
            Err(e) => {
                warn!(error = %e, "Relay link read failed");
                break;
            }
        }
    }

    if live
        .compare_exchange(generation, NO_CONNECTION, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        warn!("Relay link lost");
        let _ = events.send(LinkEvent::Disconnected);
    }
}
