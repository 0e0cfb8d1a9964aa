//! Pixel matrix storage.

use super::error::ChipError;

pub const COLS: u16 = 400;
pub const ROWS: u16 = 192;

/// Analog front-end flavour, fixed by column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontEnd {
    Sync,
    Lin,
    Diff,
}

impl FrontEnd {
    /// Front end of core column `core_col` (8 pixel columns each).
    pub fn of_core_col(core_col: u16) -> Self {
        match core_col {
            0..=15 => FrontEnd::Sync,
            16..=32 => FrontEnd::Lin,
            _ => FrontEnd::Diff,
        }
    }

    pub fn of_col(col: u16) -> Self {
        Self::of_core_col(col / 8)
    }
}

/// Per-pixel configuration byte.
///
/// Bit 0 enable, bit 1 inject, bit 2 hitbus, bits 3..=6 TDAC trim,
/// bit 7 gain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pixel(pub u8);

impl Pixel {
    const ENABLE: u8 = 0;
    const INJECT: u8 = 1;
    const HITBUS: u8 = 2;
    const TDAC: u8 = 3;
    const GAIN: u8 = 7;

    fn bit(&self, bit: u8) -> bool {
        self.0 >> bit & 1 != 0
    }

    fn set_bit(&mut self, bit: u8, on: bool) {
        if on {
            self.0 |= 1 << bit;
        } else {
            self.0 &= !(1 << bit);
        }
    }

    pub fn enabled(&self) -> bool {
        self.bit(Self::ENABLE)
    }

    pub fn set_enabled(&mut self, on: bool) {
        self.set_bit(Self::ENABLE, on);
    }

    pub fn inject(&self) -> bool {
        self.bit(Self::INJECT)
    }

    pub fn set_inject(&mut self, on: bool) {
        self.set_bit(Self::INJECT, on);
    }

    pub fn hitbus(&self) -> bool {
        self.bit(Self::HITBUS)
    }

    pub fn set_hitbus(&mut self, on: bool) {
        self.set_bit(Self::HITBUS, on);
    }

    pub fn tdac(&self) -> u8 {
        self.0 >> Self::TDAC & 0xF
    }

    pub fn set_tdac(&mut self, tdac: u8) {
        self.0 = (self.0 & !(0xF << Self::TDAC)) | (tdac & 0xF) << Self::TDAC;
    }

    pub fn gain(&self) -> bool {
        self.bit(Self::GAIN)
    }

    pub fn set_gain(&mut self, on: bool) {
        self.set_bit(Self::GAIN, on);
    }
}

/// 400 x 192 pixels.
#[derive(Debug, Clone)]
pub struct Matrix {
    pixels: Vec<Pixel>,
}

impl Matrix {
    pub fn new() -> Self {
        Self {
            pixels: vec![Pixel::default(); usize::from(COLS) * usize::from(ROWS)],
        }
    }

    fn index(col: u16, row: u16) -> Option<usize> {
        (col < COLS && row < ROWS).then(|| usize::from(col) * usize::from(ROWS) + usize::from(row))
    }

    pub fn pixel(&self, col: u16, row: u16) -> Option<Pixel> {
        Self::index(col, row).map(|i| self.pixels[i])
    }

    pub fn pixel_mut(&mut self, col: u16, row: u16) -> Result<&mut Pixel, ChipError> {
        let index = Self::index(col, row).ok_or(ChipError::PixelOutOfRange { col, row })?;
        Ok(&mut self.pixels[index])
    }

    /// Configuration of the two pixels of a double column: the even column
    /// in the low byte, the odd one in the high byte.
    pub fn get_pixel_pair(&self, double_col: u16, row: u16) -> Result<u16, ChipError> {
        let (even, odd) = self.pair_indices(double_col, row)?;
        Ok(u16::from(self.pixels[odd].0) << 8 | u16::from(self.pixels[even].0))
    }

    pub fn set_pixel_pair(&mut self, double_col: u16, row: u16, value: u16) -> Result<(), ChipError> {
        let (even, odd) = self.pair_indices(double_col, row)?;
        self.pixels[even] = Pixel(value as u8);
        self.pixels[odd] = Pixel((value >> 8) as u8);
        Ok(())
    }

    fn pair_indices(&self, double_col: u16, row: u16) -> Result<(usize, usize), ChipError> {
        let out_of_range = ChipError::PixelPairOutOfRange { double_col, row };
        let col = double_col.checked_mul(2).ok_or(out_of_range.clone())?;
        let even = Self::index(col, row).ok_or(out_of_range.clone())?;
        let odd = Self::index(col + 1, row).ok_or(out_of_range)?;
        Ok((even, odd))
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Self::new()
    }
}
