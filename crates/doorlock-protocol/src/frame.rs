//! Fixed-size frames of the relay board protocol.
//!
//! Every message on the link, in either direction, is exactly four bytes:
//!
//! ```text
//! [command] [address] [data] [checksum = command ^ address ^ data]
//! ```
//!
//! Bytes read from the wire are untrusted until their checksum has been
//! verified, so the two directions use two types:
//!
//! - [`RawFrame`]: four bytes exactly as they arrived
//! - [`SerialFrame`]: a frame whose checksum relation holds
//!
//! [`RawFrame::validate`] is the only way from the first to the second, and
//! [`SerialFrame::new`] always computes the checksum itself.
//!
//! # Example
//!
//! ```
//! use doorlock_protocol::{CommandCode, RawFrame, SerialFrame};
//!
//! let request = SerialFrame::request(CommandCode::SetSingle, 1, 0b0000_0100);
//! assert_eq!(request.to_bytes(), [6, 1, 4, 6 ^ 1 ^ 4]);
//!
//! let answer = RawFrame::from([249, 1, 4, 249 ^ 1 ^ 4]).validate().unwrap();
//! assert!(answer.is_echo_of(CommandCode::SetSingle));
//!
//! assert!(RawFrame::from([249, 1, 4, 0]).validate().is_err());
//! ```

use crate::command::CommandCode;
use doorlock_core::constants::{
    ADDRESS_OFFSET, CHECKSUM_OFFSET, COMMAND_OFFSET, DATA_OFFSET, FRAME_SIZE,
};
use doorlock_core::{Error, Result};
use std::fmt;

/// Checksum of a frame: XOR of its first three bytes.
#[inline]
#[must_use]
pub fn checksum(command: u8, address: u8, data: u8) -> u8 {
    command ^ address ^ data
}

/// A frame whose checksum is known to be consistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SerialFrame {
    command: u8,
    address: u8,
    data: u8,
}

impl SerialFrame {
    /// Build a frame from its three payload bytes; the checksum is derived.
    #[must_use]
    pub fn new(command: u8, address: u8, data: u8) -> Self {
        Self {
            command,
            address,
            data,
        }
    }

    /// Build an outgoing request frame.
    #[must_use]
    pub fn request(command: CommandCode, address: u8, data: u8) -> Self {
        Self::new(command.as_u8(), address, data)
    }

    /// Build the frame a board sends to confirm `command`.
    #[must_use]
    pub fn echo(command: CommandCode, address: u8, data: u8) -> Self {
        Self::new(command.expected_echo(), address, data)
    }

    #[inline]
    #[must_use]
    pub fn command(&self) -> u8 {
        self.command
    }

    /// The command code, if the command byte is a request code (0-8).
    #[must_use]
    pub fn command_code(&self) -> Option<CommandCode> {
        CommandCode::try_from(self.command).ok()
    }

    #[inline]
    #[must_use]
    pub fn address(&self) -> u8 {
        self.address
    }

    #[inline]
    #[must_use]
    pub fn data(&self) -> u8 {
        self.data
    }

    #[inline]
    #[must_use]
    pub fn checksum(&self) -> u8 {
        checksum(self.command, self.address, self.data)
    }

    /// Whether this frame is the board's confirmation of `command`.
    #[must_use]
    pub fn is_echo_of(&self, command: CommandCode) -> bool {
        command.is_echo(self.command)
    }

    /// Wire representation.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; FRAME_SIZE] {
        let mut bytes = [0u8; FRAME_SIZE];
        bytes[COMMAND_OFFSET] = self.command;
        bytes[ADDRESS_OFFSET] = self.address;
        bytes[DATA_OFFSET] = self.data;
        bytes[CHECKSUM_OFFSET] = self.checksum();
        bytes
    }
}

impl fmt::Display for SerialFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [c, a, d, x] = self.to_bytes();
        write!(f, "[{c:02X} {a:02X} {d:02X} {x:02X}]")
    }
}

impl From<SerialFrame> for RawFrame {
    fn from(frame: SerialFrame) -> Self {
        RawFrame(frame.to_bytes())
    }
}

/// Four bytes as received from the wire, checksum not yet verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawFrame([u8; FRAME_SIZE]);

impl RawFrame {
    /// Build a raw frame from a slice of exactly four bytes.
    ///
    /// # Errors
    /// Returns `Error::InvalidFrameLength` for any other length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; FRAME_SIZE] = bytes
            .try_into()
            .map_err(|_| Error::InvalidFrameLength(bytes.len()))?;
        Ok(RawFrame(bytes))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; FRAME_SIZE] {
        &self.0
    }

    /// Verify the checksum relation and yield a trusted frame.
    ///
    /// # Errors
    /// Returns `Error::ChecksumMismatch` if the fourth byte is not the XOR of
    /// the first three.
    pub fn validate(self) -> Result<SerialFrame> {
        let [command, address, data, actual] = self.0;
        let expected = checksum(command, address, data);
        if expected != actual {
            return Err(Error::ChecksumMismatch { expected, actual });
        }
        Ok(SerialFrame::new(command, address, data))
    }
}

impl From<[u8; FRAME_SIZE]> for RawFrame {
    fn from(bytes: [u8; FRAME_SIZE]) -> Self {
        RawFrame(bytes)
    }
}

impl fmt::Display for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [c, a, d, x] = self.0;
        write!(f, "[{c:02X} {a:02X} {d:02X} {x:02X}]")
    }
}
