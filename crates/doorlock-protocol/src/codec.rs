//! Tokio codec for the relay board link.
//!
//! `RelayCodec` wraps a [`FrameAccumulator`] so the link can be driven through
//! `tokio_util`'s `FramedRead` / `FramedWrite`:
//!
//! ```text
//! serial port -> Decoder -> RawFrame   (checksum checked by the caller)
//! SerialFrame -> Encoder -> serial port
//! ```
//!
//! The decoder deliberately yields [`RawFrame`] instead of a validated frame.
//! `FramedRead` terminates the stream on the first decoder error, and a noisy
//! line must not take the whole link down with it.
//!
//! # Usage
//!
//! ```rust,no_run
//! use doorlock_protocol::{CommandCode, RelayCodec, SerialFrame};
//! use futures::{SinkExt, StreamExt};
//! use tokio_util::codec::Framed;
//!
//! # async fn example(port: tokio::io::DuplexStream) -> doorlock_core::Result<()> {
//! let mut framed = Framed::new(port, RelayCodec::new());
//!
//! framed.send(SerialFrame::request(CommandCode::Setup, 0, 0)).await?;
//!
//! if let Some(Ok(raw)) = framed.next().await {
//!     let answer = raw.validate()?;
//!     println!("board answered {answer}");
//! }
//! # Ok(())
//! # }
//! ```

use bytes::BytesMut;
use doorlock_core::{Error, Result};
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{RawFrame, SerialFrame};
use crate::stream_parser::FrameAccumulator;

/// Codec splitting the relay link into 4-byte frames.
#[derive(Debug, Default)]
pub struct RelayCodec {
    accumulator: FrameAccumulator,
}

impl RelayCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for RelayCodec {
    type Item = RawFrame;
    type Error = Error;

    /// Move every received byte into the accumulator and hand out the oldest
    /// complete frame, if any.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if !src.is_empty() {
            self.accumulator.feed(src);
            src.clear();
        }

        Ok(self.accumulator.next_frame())
    }

    /// At end of stream, frames still queued are delivered; a partial frame is
    /// discarded.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let frame = self.decode(src)?;
        if frame.is_none() {
            self.accumulator.clear();
        }
        Ok(frame)
    }
}

impl Encoder<SerialFrame> for RelayCodec {
    type Error = Error;

    fn encode(&mut self, item: SerialFrame, dst: &mut BytesMut) -> Result<()> {
        dst.extend_from_slice(&item.to_bytes());
        Ok(())
    }
}
