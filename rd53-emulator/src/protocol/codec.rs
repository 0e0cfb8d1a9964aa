//! Streaming codecs for use with `tokio_util::codec::Framed`.
//!
//! Unlike [`super::channel::Channel`], which decodes a complete buffer,
//! these codecs see a byte stream in arbitrary pieces and must tell an item
//! that is still arriving apart from one that will never parse.

use bytes::{Buf, BytesMut};
use std::{io, marker::PhantomData};
use tokio_util::codec::{Decoder, Encoder};

use super::channel::Packet;
use super::command::Command;
use super::frame::Frame;
use super::HexBytes;
use crate::tracing::prelude::*;

pub struct StreamCodec<T> {
    skipped: u64,
    _item: PhantomData<T>,
}

/// Codec for the command link.
pub type CommandCodec = StreamCodec<Command>;

/// Codec for the data link.
pub type FrameCodec = StreamCodec<Frame>;

impl<T> StreamCodec<T> {
    pub fn new() -> Self {
        Self {
            skipped: 0,
            _item: PhantomData,
        }
    }

    /// Bytes discarded while resynchronizing since the codec was created.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl<T> Default for StreamCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Packet> Encoder<T> for StreamCodec<T> {
    type Error = io::Error;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let start = dst.len();
        item.pack(dst);
        trace!(
            item = %item,
            bytes = dst.len() - start,
            frame = %HexBytes(&dst[start..]),
            "TX {}",
            T::KIND
        );
        Ok(())
    }
}

impl<T: Packet> Decoder for StreamCodec<T> {
    type Item = T;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Return Ok(Some) with a complete item, or Ok(None) when more data is
        // needed. Returning an error terminates the stream, so corrupt bytes
        // are consumed one at a time until something parses or the buffer
        // holds only the beginning of an item.

        while !src.is_empty() {
            match T::try_unpack(&src[..]) {
                Ok((item, consumed)) => {
                    trace!(
                        item = %item,
                        bytes = consumed,
                        frame = %HexBytes(&src[..consumed]),
                        "RX {}",
                        T::KIND
                    );
                    src.advance(consumed);
                    return Ok(Some(item));
                }
                Err(err) if err.is_truncated() => break,
                Err(err) => {
                    debug!(
                        byte = %HexBytes(&src[..1]),
                        reason = %err,
                        "Resynchronizing {} stream",
                        T::KIND
                    );
                    self.skipped += 1;
                    src.advance(1);
                }
            }
        }
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None => {
                if !src.is_empty() {
                    warn!(
                        bytes = src.len(),
                        data = %HexBytes(&src[..]),
                        "Discarding partial {} at end of stream",
                        T::KIND
                    );
                    self.skipped += src.len() as u64;
                    src.clear();
                }
                Ok(None)
            }
        }
    }
}
