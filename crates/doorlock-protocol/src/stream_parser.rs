//! Positional frame accumulator for the relay board link.
//!
//! A serial port hands out bytes in whatever chunks the driver produced: half a
//! frame, two frames and a bit, one byte at a time. The relay protocol has no
//! delimiters, so frame boundaries are purely positional. Every fourth byte
//! received closes a frame and the remainder is kept for the next one.
//!
//! ```text
//! feed([F0 01])           pending: F0 01     queued: -
//! feed([0F FE FE 01])     pending: FE 01     queued: [F0 01 0F FE]
//! ```
//!
//! Frames leave the accumulator as [`RawFrame`]s: checksum validation is left
//! to the consumer so that a single corrupted frame does not end the stream.
//!
//! # Usage
//!
//! ```
//! use doorlock_protocol::FrameAccumulator;
//!
//! let mut acc = FrameAccumulator::new();
//!
//! acc.feed(&[249, 1]);
//! assert!(acc.next_frame().is_none());
//!
//! acc.feed(&[4, 249 ^ 1 ^ 4, 253]);
//! let frame = acc.next_frame().unwrap().validate().unwrap();
//! assert_eq!(frame.data(), 4);
//! assert_eq!(acc.pending_bytes(), 1);
//! ```

use bytes::{Buf, BytesMut};
use doorlock_core::constants::FRAME_SIZE;
use std::collections::VecDeque;

use crate::frame::RawFrame;

/// Initial capacity of the byte buffer; a handful of frames.
const INITIAL_BUFFER_CAPACITY: usize = 64;

/// Initial capacity of the frame queue.
const INITIAL_FRAME_QUEUE_CAPACITY: usize = 4;

/// Stateful splitter turning a byte stream into 4-byte frames.
///
/// Unlike a delimiter based parser there is nothing to resynchronise on: if a
/// byte is lost on the wire every following frame is shifted until the
/// accumulator is [`cleared`](FrameAccumulator::clear). The link layer does
/// that when a connection is (re)established.
#[derive(Debug)]
pub struct FrameAccumulator {
    /// Bytes of the frame currently being assembled, always fewer than four.
    buffer: BytesMut,

    /// Complete frames waiting to be taken.
    frames: VecDeque<RawFrame>,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            frames: VecDeque::with_capacity(INITIAL_FRAME_QUEUE_CAPACITY),
        }
    }

    /// Append received bytes, queueing every frame they complete.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);

        while self.buffer.len() >= FRAME_SIZE {
            let mut frame = [0u8; FRAME_SIZE];
            self.buffer.copy_to_slice(&mut frame);
            self.frames.push_back(RawFrame::from(frame));
        }
    }

    /// Take the oldest complete frame.
    pub fn next_frame(&mut self) -> Option<RawFrame> {
        self.frames.pop_front()
    }

    /// Number of complete frames waiting.
    pub fn frames_available(&self) -> usize {
        self.frames.len()
    }

    /// Bytes received that do not yet form a frame (0 to 3).
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing at all is buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && self.frames.is_empty()
    }

    /// Drop partial bytes and queued frames.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.frames.clear();
    }

    /// Iterate over all queued frames, removing them.
    ///
    /// ```
    /// use doorlock_protocol::FrameAccumulator;
    ///
    /// let mut acc = FrameAccumulator::new();
    /// acc.feed(&[0, 0, 0, 0, 1, 1, 1, 1]);
    ///
    /// assert_eq!(acc.drain_frames().len(), 2);
    /// assert_eq!(acc.frames_available(), 2);
    ///
    /// let frames: Vec<_> = acc.drain_frames().collect();
    /// assert_eq!(frames.len(), 2);
    /// assert_eq!(acc.frames_available(), 0);
    /// ```
    pub fn drain_frames(&mut self) -> DrainFrames<'_> {
        DrainFrames { accumulator: self }
    }
}

impl Default for FrameAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator returned by [`FrameAccumulator::drain_frames`].
#[derive(Debug)]
pub struct DrainFrames<'a> {
    accumulator: &'a mut FrameAccumulator,
}

impl Iterator for DrainFrames<'_> {
    type Item = RawFrame;

    fn next(&mut self) -> Option<Self::Item> {
        self.accumulator.next_frame()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.accumulator.frames_available();
        (len, Some(len))
    }
}

impl ExactSizeIterator for DrainFrames<'_> {
    fn len(&self) -> usize {
        self.accumulator.frames_available()
    }
}
