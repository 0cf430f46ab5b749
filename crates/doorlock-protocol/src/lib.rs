//! Wire protocol of the 8-channel serial relay board.
//!
//! - [`CommandCode`]: the nine commands the board understands
//! - [`SerialFrame`] / [`RawFrame`]: checksum-verified and untrusted 4-byte frames
//! - [`FrameAccumulator`]: positional re-segmentation of a raw byte stream
//! - [`RelayCodec`]: tokio-util codec for `FramedRead`/`FramedWrite`

pub mod codec;
pub mod command;
pub mod frame;
pub mod stream_parser;

pub use codec::RelayCodec;
pub use command::CommandCode;
pub use frame::{RawFrame, SerialFrame, checksum};
pub use stream_parser::{DrainFrames, FrameAccumulator};
