//! Error types for the relay link and the RFID reader.

use doorlock_core::Error as CoreError;

/// Result type alias for relay link and relay board operations.
pub type Result<T> = std::result::Result<T, LinkError>;

/// Result type alias for RFID reader operations.
pub type ReaderResult<T> = std::result::Result<T, ReaderError>;

/// Errors of the serial relay link.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// No connection has been established.
    #[error("Relay link is not open")]
    LinkNotOpen,

    /// `connect`/`attach` was called on a live link.
    #[error("Relay link is already open")]
    AlreadyOpen,

    /// The serial device could not be opened.
    #[error("Failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: tokio_serial::Error,
    },

    /// Writing a frame to the device failed.
    #[error("Write failed: {message}")]
    WriteFailure { message: String },

    /// No answer arrived within the response window.
    #[error("No response after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// The answer was not what the request called for.
    #[error("Protocol mismatch: {0}")]
    ProtocolMismatch(#[source] CoreError),

    /// The connection was lost (end of stream or read error).
    #[error("Relay link disconnected")]
    Disconnected,
}

impl LinkError {
    pub fn open(path: impl Into<String>, source: tokio_serial::Error) -> Self {
        Self::Open {
            path: path.into(),
            source,
        }
    }

    pub fn write_failure(message: impl Into<String>) -> Self {
        Self::WriteFailure {
            message: message.into(),
        }
    }

    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Whether the error means the link itself is unusable, as opposed to a
    /// single exchange having gone wrong.
    pub fn is_link_down(&self) -> bool {
        matches!(
            self,
            Self::LinkNotOpen | Self::Disconnected | Self::WriteFailure { .. }
        )
    }
}

/// Errors of an RFID reader.
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error("Failed to open reader {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: tokio_serial::Error,
    },

    #[error("Reader I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid UID: {0}")]
    InvalidUid(#[from] CoreError),

    #[error("Reader disconnected")]
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        assert_eq!(
            LinkError::timeout(1000).to_string(),
            "No response after 1000ms"
        );
    }

    #[test]
    fn test_protocol_mismatch_keeps_cause() {
        let error = LinkError::ProtocolMismatch(CoreError::ChecksumMismatch {
            expected: 1,
            actual: 2,
        });
        assert_eq!(
            error.to_string(),
            "Protocol mismatch: Checksum mismatch: expected 0x01, got 0x02"
        );
        assert!(!error.is_link_down());
    }

    #[test]
    fn test_link_down_classification() {
        assert!(LinkError::LinkNotOpen.is_link_down());
        assert!(LinkError::Disconnected.is_link_down());
        assert!(LinkError::write_failure("broken pipe").is_link_down());
        assert!(!LinkError::timeout(10).is_link_down());
    }
}
