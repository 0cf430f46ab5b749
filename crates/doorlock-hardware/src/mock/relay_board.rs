//! Mock relay board.
//!
//! The mock runs as a task on the far end of a `tokio::io::duplex` pipe and
//! behaves like the real board: it assigns itself an address on Setup, keeps
//! the relay port state, and answers every command with its echo. Relay
//! commands report the port mask from before the command. Every valid
//! frame it receives is recorded together with the (tokio) instant of arrival,
//! so tests running with a paused clock can assert on spacing.
//!
//! Faults can be injected for all frames ([`MockRelayBoardHandle::set_fault`])
//! or for the next frame of one command ([`MockRelayBoardHandle::fail_next`]).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use doorlock_core::{RelayMask, RelayNumber};
use doorlock_protocol::{CommandCode, RawFrame, RelayCodec, SerialFrame};
use futures::StreamExt;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::time::Instant;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Pipe buffer size; room for plenty of frames.
const PIPE_CAPACITY: usize = 1024;

/// Firmware version reported in the Setup answer.
pub const MOCK_FIRMWARE_VERSION: u8 = 11;

/// Ways the mock can misbehave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Swallow the frame: no state change, no answer.
    Silent,

    /// Apply the command, answer with a broken checksum.
    CorruptChecksum,

    /// Apply the command, answer with the request code instead of its echo.
    WrongEcho,
}

/// A frame the mock received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedFrame {
    pub frame: SerialFrame,
    pub at: Instant,
}

impl RecordedFrame {
    /// The command, if the byte is a known code.
    pub fn command(&self) -> Option<CommandCode> {
        self.frame.command_code()
    }

    /// The payload read as relays.
    pub fn mask(&self) -> RelayMask {
        RelayMask::from_bits(self.frame.data())
    }
}

#[derive(Debug)]
struct MockState {
    setup_address: u8,
    assigned: bool,
    port: u8,
    option: u8,
    frames: Vec<RecordedFrame>,
    fault: Option<Fault>,
    one_shot: Vec<(CommandCode, Fault)>,
    response_delay: Duration,
}

impl MockState {
    fn take_fault(&mut self, command: CommandCode) -> Option<Fault> {
        match self.one_shot.iter().position(|(c, _)| *c == command) {
            Some(index) => Some(self.one_shot.remove(index).1),
            None => self.fault,
        }
    }

    /// Process one inbound frame; returns the bytes to answer with.
    fn handle(&mut self, raw: RawFrame) -> Option<[u8; 4]> {
        let frame = raw.validate().ok()?;
        self.frames.push(RecordedFrame {
            frame,
            at: Instant::now(),
        });

        let command = frame.command_code()?;
        let fault = self.take_fault(command);
        if fault == Some(Fault::Silent) {
            trace!(%frame, "Mock board staying silent");
            return None;
        }

        let payload = frame.data();
        let data = match command {
            CommandCode::NoOperation => 0,
            CommandCode::Setup => {
                self.assigned = true;
                MOCK_FIRMWARE_VERSION
            }
            CommandCode::GetPort => self.port,
            CommandCode::SetPort => {
                self.port = payload;
                self.port
            }
            CommandCode::GetOption => self.option,
            CommandCode::SetOption => {
                self.option = payload;
                self.option
            }
            // Relay commands answer with the port as it was before.
            CommandCode::SetSingle => {
                let new_port = self.port | payload;
                std::mem::replace(&mut self.port, new_port)
            },
            CommandCode::DelSingle => {
                let new_port = self.port & !payload;
                std::mem::replace(&mut self.port, new_port)
            },
            CommandCode::Toggle => {
                let new_port = self.port ^ payload;
                std::mem::replace(&mut self.port, new_port)
            },
        };

        let address = if self.assigned { self.setup_address } else { 0 };
        let reply = match fault {
            Some(Fault::WrongEcho) => SerialFrame::new(command.as_u8(), address, data).to_bytes(),
            Some(Fault::CorruptChecksum) => {
                let mut bytes = SerialFrame::echo(command, address, data).to_bytes();
                bytes[3] ^= 0xFF;
                bytes
            }
            _ => SerialFrame::echo(command, address, data).to_bytes(),
        };
        Some(reply)
    }
}

/// Factory for mock boards.
pub struct MockRelayBoard;

impl MockRelayBoard {
    /// Spawn a mock board that assigns itself address 1.
    ///
    /// Returns the host end of the pipe (attach it to a
    /// [`RelayLink`](crate::RelayLink)) and a handle to inspect and steer the
    /// board. Must be called inside a tokio runtime.
    ///
    /// ```
    /// use doorlock_hardware::mock::MockRelayBoard;
    /// use doorlock_hardware::{RelayBoard, RelayLink};
    /// use doorlock_core::RelayNumber;
    /// use std::time::Duration;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> doorlock_hardware::Result<()> {
    /// let (io, mock) = MockRelayBoard::spawn();
    /// let board = RelayBoard::new(RelayLink::new("mock", Duration::from_millis(100)));
    /// board.link().attach(io).await?;
    ///
    /// assert!(board.setup().await);
    /// board.set_single(RelayNumber::new(3).unwrap()).await?;
    /// assert!(mock.is_on(RelayNumber::new(3).unwrap()));
    /// # Ok(())
    /// # }
    /// ```
    pub fn spawn() -> (DuplexStream, MockRelayBoardHandle) {
        Self::spawn_with_address(1)
    }

    /// Spawn a mock board that assigns itself `address` (0 simulates a board
    /// that fails to address itself).
    pub fn spawn_with_address(address: u8) -> (DuplexStream, MockRelayBoardHandle) {
        let (host, device) = tokio::io::duplex(PIPE_CAPACITY);
        let state = Arc::new(Mutex::new(MockState {
            setup_address: address,
            assigned: false,
            port: 0,
            option: 0,
            frames: Vec::new(),
            fault: None,
            one_shot: Vec::new(),
            response_delay: Duration::ZERO,
        }));
        let unplug = CancellationToken::new();

        tokio::spawn(serve(device, Arc::clone(&state), unplug.clone()));

        (host, MockRelayBoardHandle { state, unplug })
    }
}

async fn serve(device: DuplexStream, state: Arc<Mutex<MockState>>, unplug: CancellationToken) {
    let (read_half, mut write_half) = tokio::io::split(device);
    let mut frames = FramedRead::new(read_half, RelayCodec::new());

    loop {
        let raw = tokio::select! {
            _ = unplug.cancelled() => return,
            next = frames.next() => match next {
                Some(Ok(raw)) => raw,
                _ => return,
            },
        };

        let (reply, delay) = {
            let mut state = lock(&state);
            (state.handle(raw), state.response_delay)
        };

        if let Some(bytes) = reply {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if write_half.write_all(&bytes).await.is_err() {
                return;
            }
        }
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Inspects and steers a mock board.
#[derive(Debug, Clone)]
pub struct MockRelayBoardHandle {
    state: Arc<Mutex<MockState>>,
    unplug: CancellationToken,
}

impl MockRelayBoardHandle {
    /// Every valid frame received so far.
    pub fn frames(&self) -> Vec<RecordedFrame> {
        lock(&self.state).frames.clone()
    }

    /// Frames received for one command.
    pub fn requests(&self, command: CommandCode) -> Vec<RecordedFrame> {
        lock(&self.state)
            .frames
            .iter()
            .filter(|recorded| recorded.command() == Some(command))
            .copied()
            .collect()
    }

    pub fn clear_frames(&self) {
        lock(&self.state).frames.clear();
    }

    /// Current relay port state.
    pub fn port(&self) -> RelayMask {
        RelayMask::from_bits(lock(&self.state).port)
    }

    pub fn is_on(&self, relay: RelayNumber) -> bool {
        self.port().contains(relay)
    }

    /// Overwrite the port state without any frame exchange.
    pub fn set_port(&self, state: RelayMask) {
        lock(&self.state).port = state.bits();
    }

    pub fn option(&self) -> u8 {
        lock(&self.state).option
    }

    /// Whether Setup has been received.
    pub fn is_addressed(&self) -> bool {
        lock(&self.state).assigned
    }

    /// Misbehave on every frame until cleared with `None`.
    pub fn set_fault(&self, fault: Option<Fault>) {
        lock(&self.state).fault = fault;
    }

    /// Misbehave on the next frame carrying `command` only.
    pub fn fail_next(&self, command: CommandCode, fault: Fault) {
        lock(&self.state).one_shot.push((command, fault));
    }

    /// Wait this long before answering.
    pub fn set_response_delay(&self, delay: Duration) {
        lock(&self.state).response_delay = delay;
    }

    /// Stop the board; the host sees end of stream.
    pub fn unplug(&self) {
        self.unplug.cancel();
    }
}
