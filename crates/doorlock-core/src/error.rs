use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Protocol errors
    #[error("Checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("Invalid command code: {0}")]
    InvalidCommandCode(u8),

    #[error("Invalid frame length: expected 4 bytes, got {0}")]
    InvalidFrameLength(usize),

    #[error("Unexpected echo: expected {expected}, got {actual}")]
    UnexpectedEcho { expected: u8, actual: u8 },

    // Domain validation errors
    #[error("Relay number must be 1-8, got {0}")]
    InvalidRelayNumber(u8),

    #[error("Board address must be 1-255, got 0")]
    UnassignedAddress,

    #[error("Invalid card UID: {0}")]
    InvalidUid(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
