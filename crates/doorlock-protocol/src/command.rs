//! Command codes understood by the relay board.
//!
//! # Command Table
//!
//! | Code | Command       | Payload          | Answer data         |
//! |------|---------------|------------------|---------------------|
//! | 0    | `NoOperation` | ignored          | ignored             |
//! | 1    | `Setup`       | ignored          | firmware version    |
//! | 2    | `GetPort`     | ignored          | port state          |
//! | 3    | `SetPort`     | new port state   | port state          |
//! | 4    | `GetOption`   | ignored          | option byte         |
//! | 5    | `SetOption`   | new option byte  | option byte         |
//! | 6    | `SetSingle`   | relays to set    | previous port state |
//! | 7    | `DelSingle`   | relays to clear  | previous port state |
//! | 8    | `Toggle`      | relays to toggle | previous port state |
//!
//! # Echo
//!
//! The board confirms a command by answering with the complement
//! `255 - code` in the command byte. `NoOperation` is the exception: its answer
//! is always `255`.
//!
//! ```
//! use doorlock_protocol::CommandCode;
//!
//! assert_eq!(CommandCode::Setup.expected_echo(), 254);
//! assert_eq!(CommandCode::SetSingle.expected_echo(), 249);
//! assert_eq!(CommandCode::NoOperation.expected_echo(), 255);
//!
//! assert_eq!(CommandCode::try_from(8).unwrap(), CommandCode::Toggle);
//! assert!(CommandCode::try_from(9).is_err());
//! ```

use doorlock_core::constants::{NOP_SUCCESS, RESPONSE_COMPLEMENT};
use doorlock_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Relay board command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CommandCode {
    /// Round-trip without side effects.
    NoOperation = 0,

    /// Ask the board to assign itself an address.
    Setup = 1,

    /// Read the relay port state.
    GetPort = 2,

    /// Overwrite the whole relay port state.
    SetPort = 3,

    /// Read the option byte.
    GetOption = 4,

    /// Overwrite the option byte.
    SetOption = 5,

    /// Energize the relays selected by the payload.
    SetSingle = 6,

    /// De-energize the relays selected by the payload.
    DelSingle = 7,

    /// Flip the relays selected by the payload.
    Toggle = 8,
}

impl CommandCode {
    /// All command codes in wire order.
    pub const ALL: [CommandCode; 9] = [
        CommandCode::NoOperation,
        CommandCode::Setup,
        CommandCode::GetPort,
        CommandCode::SetPort,
        CommandCode::GetOption,
        CommandCode::SetOption,
        CommandCode::SetSingle,
        CommandCode::DelSingle,
        CommandCode::Toggle,
    ];

    #[inline]
    #[must_use]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Command byte the board answers with when it accepted this command.
    #[inline]
    #[must_use]
    pub fn expected_echo(self) -> u8 {
        match self {
            CommandCode::NoOperation => NOP_SUCCESS,
            other => RESPONSE_COMPLEMENT - other.as_u8(),
        }
    }

    /// Whether `command_byte` confirms this command.
    #[inline]
    #[must_use]
    pub fn is_echo(self, command_byte: u8) -> bool {
        command_byte == self.expected_echo()
    }

    /// Name used in logs.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            CommandCode::NoOperation => "NoOperation",
            CommandCode::Setup => "Setup",
            CommandCode::GetPort => "GetPort",
            CommandCode::SetPort => "SetPort",
            CommandCode::GetOption => "GetOption",
            CommandCode::SetOption => "SetOption",
            CommandCode::SetSingle => "SetSingle",
            CommandCode::DelSingle => "DelSingle",
            CommandCode::Toggle => "Toggle",
        }
    }
}

impl TryFrom<u8> for CommandCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        CommandCode::ALL
            .get(usize::from(value))
            .copied()
            .ok_or(Error::InvalidCommandCode(value))
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.as_u8())
    }
}
