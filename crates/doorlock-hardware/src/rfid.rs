//! RFID reader abstraction and the scan pump.
//!
//! A reader is anything that yields card UIDs ([`RfidReader`]). The real one,
//! [`SerialRfidReader`], reads one UID per text line from a serial device. The
//! [`ScanPump`] turns UIDs into [`AccessEvent`]s for the access controller and
//! republishes every UID on a broadcast feed for enrollment front ends.

use std::future::Future;

use doorlock_core::{AccessEvent, Uid};
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ReaderError, ReaderResult};

/// Longest line accepted from a reader.
const MAX_LINE_LENGTH: usize = 256;

/// Capacity of the scanned-UID feed.
const SCAN_FEED_CAPACITY: usize = 32;

/// Source of card UIDs.
///
/// Implementations may use `async fn`; the returned future must be `Send` so
/// the pump can run on a spawned task.
pub trait RfidReader: Send {
    /// Wait for the next card.
    ///
    /// # Errors
    /// Fails when the reader can no longer produce UIDs.
    fn read_uid(&mut self) -> impl Future<Output = ReaderResult<Uid>> + Send;
}

/// Line-oriented RFID reader on a serial device.
#[derive(Debug)]
pub struct SerialRfidReader<R = SerialStream> {
    lines: FramedRead<R, LinesCodec>,
}

impl SerialRfidReader {
    /// Open the reader's serial device (8N1 at `baud_rate`).
    pub fn open(path: &str, baud_rate: u32) -> ReaderResult<Self> {
        let port = tokio_serial::new(path, baud_rate)
            .open_native_async()
            .map_err(|source| ReaderError::Open {
                path: path.to_string(),
                source,
            })?;
        info!(path, baud_rate, "RFID reader opened");
        Ok(Self::from_reader(port))
    }
}

impl<R> SerialRfidReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Read UIDs from any byte stream.
    pub fn from_reader(reader: R) -> Self {
        Self {
            lines: FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH)),
        }
    }
}

impl<R> RfidReader for SerialRfidReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn read_uid(&mut self) -> ReaderResult<Uid> {
        loop {
            let line = match self.lines.next().await {
                Some(Ok(line)) => line,
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    // The codec drops the rest of the line and resynchronizes.
                    warn!(max = MAX_LINE_LENGTH, "Ignoring oversized line from reader");
                    continue;
                }
                Some(Err(LinesCodecError::Io(e))) => return Err(ReaderError::Io(e)),
                None => return Err(ReaderError::Disconnected),
            };

            if line.trim().is_empty() {
                continue;
            }
            match Uid::new(&line) {
                Ok(uid) => return Ok(uid),
                Err(e) => warn!(line = %line.trim(), error = %e, "Ignoring unreadable scan"),
            }
        }
    }
}

/// Moves scans from a reader to the access controller.
#[derive(Debug, Clone)]
pub struct ScanPump {
    feed: broadcast::Sender<Uid>,
}

impl ScanPump {
    /// A pump with an empty scan feed.
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(SCAN_FEED_CAPACITY);
        Self { feed }
    }

    /// Every UID scanned from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Uid> {
        self.feed.subscribe()
    }

    /// Forward scans until `cancel` fires or the controller hangs up.
    ///
    /// # Errors
    /// Returns the reader's error if it stops producing UIDs.
    pub async fn run<R>(
        &self,
        mut reader: R,
        events: mpsc::Sender<AccessEvent>,
        cancel: CancellationToken,
    ) -> ReaderResult<()>
    where
        R: RfidReader,
    {
        loop {
            let uid = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Scan pump cancelled");
                    return Ok(());
                }
                result = reader.read_uid() => result?,
            };

            info!(%uid, "Card scanned");
            let _ = self.feed.send(uid.clone());

            if events.send(AccessEvent::new(uid)).await.is_err() {
                debug!("Access controller gone, stopping scan pump");
                return Ok(());
            }
        }
    }

    /// Run the pump on its own task.
    pub fn spawn<R>(
        &self,
        reader: R,
        events: mpsc::Sender<AccessEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<ReaderResult<()>>
    where
        R: RfidReader + 'static,
    {
        let pump = self.clone();
        tokio::spawn(async move { pump.run(reader, events, cancel).await })
    }
}

impl Default for ScanPump {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_serial_reader_trims_and_normalizes() {
        let (mut device, host) = tokio::io::duplex(256);
        let mut reader = SerialRfidReader::from_reader(host);

        device.write_all(b"  04abcdef \r\n").await.unwrap();

        let uid = reader.read_uid().await.unwrap();
        assert_eq!(uid.as_str(), "04ABCDEF");
    }

    #[tokio::test]
    async fn test_serial_reader_skips_blank_lines() {
        let (mut device, host) = tokio::io::duplex(256);
        let mut reader = SerialRfidReader::from_reader(host);

        device.write_all(b"\n   \r\n\n1234\n").await.unwrap();

        assert_eq!(reader.read_uid().await.unwrap().as_str(), "1234");
    }

    #[tokio::test]
    async fn test_serial_reader_skips_unreadable_lines() {
        let (mut device, host) = tokio::io::duplex(256);
        let mut reader = SerialRfidReader::from_reader(host);

        device.write_all(b"04 AB\nBEEF\n").await.unwrap();

        assert_eq!(reader.read_uid().await.unwrap().as_str(), "BEEF");
    }

    #[tokio::test]
    async fn test_serial_reader_end_of_stream() {
        let (device, host) = tokio::io::duplex(256);
        let mut reader = SerialRfidReader::from_reader(host);
        drop(device);

        assert!(matches!(
            reader.read_uid().await,
            Err(ReaderError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_serial_reader_recovers_after_oversized_line() {
        let (mut device, host) = tokio::io::duplex(1024);
        let mut reader = SerialRfidReader::from_reader(host);

        device.write_all(&[b'A'; 300]).await.unwrap();
        device.write_all(b"\n04C0FFEE\n").await.unwrap();

        assert_eq!(reader.read_uid().await.unwrap().as_str(), "04C0FFEE");
    }
}
