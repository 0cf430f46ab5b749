//! Simulated devices for tests and for running without hardware.
//!
//! - [`MockRelayBoard`]: a relay board on the far end of a `tokio::io::duplex`
//!   pipe, recording every frame and able to misbehave on demand
//! - [`MockRfid`]: a reader whose scans are injected through a handle

pub mod relay_board;
pub mod rfid;

pub use relay_board::{Fault, MockRelayBoard, MockRelayBoardHandle, RecordedFrame};
pub use rfid::{MockRfid, MockRfidHandle};
