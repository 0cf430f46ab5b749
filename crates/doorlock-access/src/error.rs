use doorlock_hardware::LinkError;
use thiserror::Error;

/// Failures of an access attempt or of the controller lifecycle.
#[derive(Debug, Error)]
pub enum AccessError {
    /// A relay command failed outside an access sequence.
    #[error("Relay board error: {0}")]
    Relay(#[from] LinkError),

    /// The board did not answer Setup.
    #[error("Relay board setup failed")]
    SetupFailed,

    /// The door relay could not be cleared. The door may be open.
    #[error("Door not secured after {attempts} attempts")]
    DoorNotSecured { attempts: u32 },

    /// The relay link is lost; no relay commands are issued.
    #[error("Relay link is down")]
    LinkDown,

    /// The controller has been shut down.
    #[error("Access controller is shutting down")]
    ShuttingDown,
}

impl AccessError {
    /// Whether the door may have been left energized.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DoorNotSecured { .. })
    }
}

pub type Result<T> = std::result::Result<T, AccessError>;
