//! Error types for RD53A protocol operations

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Identifier mismatch at offset 0")]
    IdentifierMismatch,

    #[error("Truncated payload: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("Invalid symbol 0x{byte:02x} at offset {offset}")]
    InvalidSymbol { byte: u8, offset: usize },

    #[error("Invalid trigger pattern: 0x{0:02x}")]
    InvalidTriggerPattern(u8),

    #[error("Invalid aurora code: 0x{0:02x}")]
    InvalidAuroraCode(u8),

    #[error("Field {field} out of range: {value} (max {max})")]
    FieldOutOfRange {
        field: &'static str,
        value: u32,
        max: u32,
    },
}

impl ProtocolError {
    /// Whether the bytes matched the variant's identifier but ran out.
    ///
    /// Streaming decoders wait for more input instead of resynchronizing.
    pub fn is_truncated(&self) -> bool {
        matches!(self, ProtocolError::Truncated { .. })
    }
}

/// Check that a field fits its declared bit width.
pub(crate) fn check_width(field: &'static str, value: u32, bits: u32) -> Result<(), ProtocolError> {
    let max = (1u32 << bits) - 1;
    if value > max {
        return Err(ProtocolError::FieldOutOfRange { field, value, max });
    }
    Ok(())
}
