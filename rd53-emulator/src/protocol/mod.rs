//! RD53A command and data link protocol.
//!
//! This module handles the encoding and decoding of commands (host to chip)
//! and frames (chip to host), both for complete buffers ([`channel`]) and
//! for byte streams ([`codec`]).

pub mod channel;
pub mod codec;
pub mod command;
pub mod error;
pub mod frame;
pub mod symbol;

use std::fmt;

pub use channel::{Channel, CommandChannel, FrameChannel, Packet, SkippedByte};
pub use codec::{CommandCodec, FrameCodec};
pub use command::{Cal, Command, Pulse, RdReg, Trigger, WrReg, WriteData};
pub use error::ProtocolError;
pub use frame::{DataFormat, DataFrame, EventHeader, Frame, Hit, RegisterFrame, RegisterSlot, SubFrame};

/// Wrapper for formatting byte slices as space-separated hex.
pub struct HexBytes<'a>(pub &'a [u8]);

impl fmt::Display for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
