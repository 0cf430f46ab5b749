//! Core constants for the relay board protocol and the access sequences.
//!
//! The relay board speaks a fixed-size binary protocol over a serial line:
//!
//! ```text
//! +---------+---------+------+----------+
//! | command | address | data | checksum |
//! +---------+---------+------+----------+
//!   1 byte    1 byte   1 byte   1 byte
//!
//! checksum = command ^ address ^ data
//! ```
//!
//! There are no delimiters on the wire: frames are recognised purely by
//! position, every fourth byte closes a frame. A successful answer carries the
//! complement `255 - command` in its command byte, with the exception of
//! `NoOperation` whose answer is always `255`.
//!
//! # Usage
//!
//! ```
//! use doorlock_core::constants::*;
//!
//! assert_eq!(FRAME_SIZE, 4);
//! assert_eq!(RELAY_BAUD_RATE, 19_200);
//!
//! // Expected echo for SetSingle (6)
//! assert_eq!(RESPONSE_COMPLEMENT - 6, 249);
//! ```

// ============================================================================
// Serial Line
// ============================================================================

/// Baud rate of the relay board serial line.
pub const RELAY_BAUD_RATE: u32 = 19_200;

/// Default baud rate of the RFID reader serial line.
pub const DEFAULT_RFID_BAUD_RATE: u32 = 9_600;

// ============================================================================
// Framing
// ============================================================================

/// Size of every frame on the relay board link, in bytes.
pub const FRAME_SIZE: usize = 4;

/// Offset of the command byte within a frame.
pub const COMMAND_OFFSET: usize = 0;

/// Offset of the address byte within a frame.
pub const ADDRESS_OFFSET: usize = 1;

/// Offset of the data byte within a frame.
pub const DATA_OFFSET: usize = 2;

/// Offset of the checksum byte within a frame.
pub const CHECKSUM_OFFSET: usize = 3;

/// A response's command byte is this value minus the request's command code.
pub const RESPONSE_COMPLEMENT: u8 = 255;

/// Command byte of a successful `NoOperation` answer.
pub const NOP_SUCCESS: u8 = 255;

/// Address used in frames sent before the board has been set up.
pub const UNASSIGNED_ADDRESS: u8 = 0;

// ============================================================================
// Relays
// ============================================================================

/// Number of relays on one board.
pub const RELAY_COUNT: u8 = 8;

/// Mask addressing every relay at once.
pub const ALL_RELAYS_MASK: u8 = 0xFF;

// ============================================================================
// Timing Defaults (milliseconds)
// ============================================================================

/// How long a request waits for the board's answer.
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 1_000;

/// Pause between single-relay steps of a staggered bulk operation.
pub const DEFAULT_STAGGER_DELAY_MS: u64 = 100;

/// How long the door strike stays energized after a granted access.
pub const DEFAULT_DOOR_OPEN_MS: u64 = 3_000;

/// How long the red and yellow lamps stay lit after a denied access.
pub const DEFAULT_DENY_DWELL_MS: u64 = 1_500;

/// How many times clearing the door relay is attempted before giving up.
pub const DEFAULT_CLOSE_ATTEMPTS: u32 = 3;

/// Back-off between relay link reconnection attempts.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5_000;
