//! Mock RFID reader.

use doorlock_core::Uid;
use tokio::sync::mpsc;

use crate::error::{ReaderError, ReaderResult};
use crate::rfid::RfidReader;

const SCAN_QUEUE_CAPACITY: usize = 32;

/// RFID reader fed by a [`MockRfidHandle`].
///
/// # Examples
///
/// ```
/// use doorlock_hardware::mock::MockRfid;
/// use doorlock_hardware::rfid::RfidReader;
///
/// #[tokio::main]
/// async fn main() -> doorlock_hardware::ReaderResult<()> {
///     let (mut reader, handle) = MockRfid::new();
///
///     handle.present("04abcdef").await?;
///
///     let uid = reader.read_uid().await?;
///     assert_eq!(uid.as_str(), "04ABCDEF");
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockRfid {
    scans: mpsc::Receiver<Uid>,
}

impl MockRfid {
    pub fn new() -> (Self, MockRfidHandle) {
        let (tx, scans) = mpsc::channel(SCAN_QUEUE_CAPACITY);
        (Self { scans }, MockRfidHandle { scans: tx })
    }
}

impl RfidReader for MockRfid {
    async fn read_uid(&mut self) -> ReaderResult<Uid> {
        self.scans.recv().await.ok_or(ReaderError::Disconnected)
    }
}

/// Presents cards to a [`MockRfid`]. Dropping every handle disconnects the
/// reader.
#[derive(Debug, Clone)]
pub struct MockRfidHandle {
    scans: mpsc::Sender<Uid>,
}

impl MockRfidHandle {
    /// Scan a card.
    ///
    /// # Errors
    /// `InvalidUid` for a malformed UID, `Disconnected` if the reader is gone.
    pub async fn present(&self, uid: &str) -> ReaderResult<()> {
        let uid = Uid::new(uid)?;
        self.scans
            .send(uid)
            .await
            .map_err(|_| ReaderError::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scans_arrive_in_order() {
        let (mut reader, handle) = MockRfid::new();

        handle.present("aa").await.unwrap();
        handle.present("bb").await.unwrap();

        assert_eq!(reader.read_uid().await.unwrap().as_str(), "AA");
        assert_eq!(reader.read_uid().await.unwrap().as_str(), "BB");
    }

    #[tokio::test]
    async fn test_invalid_uid_rejected() {
        let (_reader, handle) = MockRfid::new();
        assert!(matches!(
            handle.present("   ").await,
            Err(ReaderError::InvalidUid(_))
        ));
    }

    #[tokio::test]
    async fn test_dropped_handle_disconnects() {
        let (mut reader, handle) = MockRfid::new();
        drop(handle);
        assert!(matches!(
            reader.read_uid().await,
            Err(ReaderError::Disconnected)
        ));
    }
}
