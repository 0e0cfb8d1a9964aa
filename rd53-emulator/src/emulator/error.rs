//! Error types for chip state access

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChipError {
    #[error("Invalid register address: {0}")]
    InvalidRegisterAddress(u16),

    #[error("Pixel pair out of range: double column {double_col}, row {row}")]
    PixelPairOutOfRange { double_col: u16, row: u16 },

    #[error("Pixel out of range: column {col}, row {row}")]
    PixelOutOfRange { col: u16, row: u16 },
}
