//! Byte-buffer channels for commands and frames.
//!
//! A channel holds an ordered list of items and the contiguous byte
//! buffer they encode to. Decoding tries the item parsers at the current
//! position; when nothing matches, one byte is skipped and reported, and
//! decoding resumes at the next byte.

use bytes::BytesMut;
use std::fmt;

use super::command::Command;
use super::error::ProtocolError;
use super::frame::Frame;
use super::HexBytes;
use crate::tracing::prelude::*;

/// An item that can be carried by a [`Channel`].
pub trait Packet: Sized + fmt::Display + fmt::Debug {
    /// Name used in diagnostics.
    const KIND: &'static str;

    /// Append the wire encoding to `dst`, returning the bytes written.
    fn pack(&self, dst: &mut BytesMut) -> usize;

    /// Parse the item at the start of `src`, returning it and the number of
    /// bytes consumed.
    fn try_unpack(src: &[u8]) -> Result<(Self, usize), ProtocolError>;
}

impl Packet for Command {
    const KIND: &'static str = "command";

    fn pack(&self, dst: &mut BytesMut) -> usize {
        Command::pack(self, dst)
    }

    fn try_unpack(src: &[u8]) -> Result<(Self, usize), ProtocolError> {
        Command::try_unpack(src)
    }
}

impl Packet for Frame {
    const KIND: &'static str = "frame";

    fn pack(&self, dst: &mut BytesMut) -> usize {
        Frame::pack(self, dst)
    }

    fn try_unpack(src: &[u8]) -> Result<(Self, usize), ProtocolError> {
        Frame::try_unpack(src)
    }
}

/// A byte that matched no item and was skipped during decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedByte {
    pub offset: usize,
    pub byte: u8,
    pub reason: ProtocolError,
}

/// Ordered items and their byte encoding.
#[derive(Debug)]
pub struct Channel<T> {
    items: Vec<T>,
    skipped: Vec<SkippedByte>,
    bytes: BytesMut,
}

/// Host to chip.
pub type CommandChannel = Channel<Command>;

/// Chip to host.
pub type FrameChannel = Channel<Frame>;

impl<T: Packet> Channel<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            skipped: Vec::new(),
            bytes: BytesMut::new(),
        }
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Remove and return the items, leaving the channel's bytes intact.
    pub fn take_items(&mut self) -> Vec<T> {
        std::mem::take(&mut self.items)
    }

    /// Bytes skipped by the last [`decode`](Self::decode).
    pub fn skipped(&self) -> &[SkippedByte] {
        &self.skipped
    }

    /// Bytes produced by the last [`encode`](Self::encode).
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Discard items, bytes and diagnostics.
    pub fn clear(&mut self) {
        self.items.clear();
        self.skipped.clear();
        self.bytes.clear();
    }

    /// Pack every item, in order, into the channel's byte buffer.
    pub fn encode(&mut self) -> &[u8] {
        self.bytes.clear();
        for item in &self.items {
            item.pack(&mut self.bytes);
        }
        trace!(
            kind = T::KIND,
            items = self.items.len(),
            bytes = self.bytes.len(),
            "Encoded channel"
        );
        &self.bytes
    }

    /// Decode `src` into items, replacing the current ones.
    ///
    /// Returns the number of items decoded. Undecodable bytes are skipped
    /// one at a time and recorded in [`skipped`](Self::skipped).
    pub fn decode(&mut self, src: &[u8]) -> usize {
        self.items.clear();
        self.skipped.clear();
        self.bytes.clear();
        self.bytes.extend_from_slice(src);

        let mut pos = 0;
        while pos < src.len() {
            match T::try_unpack(&src[pos..]) {
                Ok((item, consumed)) => {
                    trace!(
                        offset = pos,
                        item = %item,
                        bytes = %HexBytes(&src[pos..pos + consumed]),
                        "RX {}",
                        T::KIND
                    );
                    self.items.push(item);
                    pos += consumed;
                }
                Err(reason) => {
                    warn!(
                        offset = pos,
                        byte = %HexBytes(&src[pos..=pos]),
                        reason = %reason,
                        "Skipping undecodable {} byte",
                        T::KIND
                    );
                    self.skipped.push(SkippedByte {
                        offset: pos,
                        byte: src[pos],
                        reason,
                    });
                    pos += 1;
                }
            }
        }
        self.items.len()
    }
}

impl<T: Packet> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}
