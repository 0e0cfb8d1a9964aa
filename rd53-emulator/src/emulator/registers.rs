//! Global configuration registers.
//!
//! The chip has 138 addressable 16-bit registers. Most hold several
//! bit fields; only the fields the emulator acts on are named here.

use super::error::ChipError;

pub const REGISTER_COUNT: usize = 138;

/// A bit field within one register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub address: u16,
    pub offset: u8,
    pub width: u8,
}

impl Field {
    pub const fn new(address: u16, offset: u8, width: u8) -> Self {
        Self {
            address,
            offset,
            width,
        }
    }

    const fn mask(&self) -> u16 {
        if self.width >= 16 {
            u16::MAX
        } else {
            (1 << self.width) - 1
        }
    }
}

/// Named registers and fields.
pub mod fields {
    use super::Field;

    pub const PIX_PORTAL: Field = Field::new(0, 0, 16);
    pub const REGION_COL: Field = Field::new(1, 0, 8);
    pub const REGION_ROW: Field = Field::new(2, 0, 9);
    pub const IBIAS_KRUM_SYNC: Field = Field::new(8, 0, 16);
    pub const VTH_SYNC: Field = Field::new(12, 0, 16);
    pub const KRUM_CURR_LIN: Field = Field::new(16, 0, 9);
    pub const VTH_LIN: Field = Field::new(20, 0, 10);
    pub const VFF_DIFF: Field = Field::new(25, 0, 10);
    pub const VTH1_DIFF: Field = Field::new(26, 0, 10);
    pub const EN_CORE_COL_SYNC: Field = Field::new(32, 0, 16);
    pub const EN_CORE_COL_LIN_1: Field = Field::new(33, 0, 16);
    pub const EN_CORE_COL_LIN_2: Field = Field::new(34, 0, 1);
    pub const EN_CORE_COL_DIFF_1: Field = Field::new(35, 0, 16);
    pub const EN_CORE_COL_DIFF_2: Field = Field::new(36, 0, 1);
    pub const INJ_MODE_DIG: Field = Field::new(39, 4, 1);
    pub const VCAL_HIGH: Field = Field::new(41, 0, 12);
    pub const VCAL_MED: Field = Field::new(42, 0, 12);
    pub const MON_FRAME_SKIP: Field = Field::new(45, 0, 8);
    pub const ADC_READ: Field = Field::new(136, 0, 16);
}

/// Power-on values, as (address, value). Unlisted registers reset to 0.
const DEFAULTS: &[(u16, u16)] = &[
    (4, 0x9CE2),
    (5, 100),
    (6, 150),
    (7, 100),
    (8, 140),
    (9, 200),
    (10, 100),
    (11, 450),
    (12, 300),
    (13, 490),
    (14, 300),
    (15, 20),
    (16, 50),
    (17, 80),
    (18, 110),
    (19, 300),
    (20, 408),
    (21, 533),
    (22, 542),
    (23, 551),
    (24, 528),
    (25, 164),
    (26, 1023),
    (28, 20),
    (29, 1 << 1),
    (30, 1 << 2),
    (31, 16 << 5 | 16),
    (32, 0xFF),
    (33, 0xFF),
    (34, 1),
    (35, 0xFF),
    (36, 1),
    (37, 500),
    (38, 16),
    (39, 1 << 4),
    (41, 500),
    (42, 300),
    (45, 50),
    (46, 0xFFFF),
    (47, 0xFFFF),
    (48, 0xFFFF),
    (49, 0xFFFF),
    (50, 0xFFFF),
    (51, 0xFFFF),
    (52, 0xFFFF),
    (53, 0xFFFF),
    (54, 0xF),
    (55, 0xFFFF),
    (56, 0xFFFF),
    (57, 0xFFFF),
    (58, 0xFFFF),
    (59, 0xF),
    (61, 1 << 2),
    (69, 0xF),
    (70, 500),
    (73, 25 << 2 | 3),
    (74, 15 << 4),
    (75, 15),
    (76, 32),
    (101, 136),
    (102, 130),
    (103, 118),
    (104, 119),
    (105, 120),
    (106, 121),
    (107, 122),
    (108, 123),
];

/// Register values plus a per-register "updated" flag.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    values: [u16; REGISTER_COUNT],
    updated: [bool; REGISTER_COUNT],
}

impl RegisterFile {
    pub fn new() -> Self {
        let mut values = [0; REGISTER_COUNT];
        for &(address, value) in DEFAULTS {
            values[usize::from(address)] = value;
        }
        Self {
            values,
            updated: [false; REGISTER_COUNT],
        }
    }

    /// Value at `address`. Addresses past the register file read as 0,
    /// like unimplemented addresses on the chip.
    pub fn get(&self, address: u16) -> u16 {
        self.values.get(usize::from(address)).copied().unwrap_or(0)
    }

    pub fn set(&mut self, address: u16, value: u16) -> Result<(), ChipError> {
        let index = usize::from(address);
        if index >= REGISTER_COUNT {
            return Err(ChipError::InvalidRegisterAddress(address));
        }
        self.values[index] = value;
        self.updated[index] = true;
        Ok(())
    }

    pub fn field(&self, field: Field) -> u16 {
        (self.get(field.address) >> field.offset) & field.mask()
    }

    pub fn set_field(&mut self, field: Field, value: u16) -> Result<(), ChipError> {
        let mask = field.mask() << field.offset;
        let current = self.get(field.address);
        self.set(field.address, (current & !mask) | ((value << field.offset) & mask))
    }

    /// Addresses written since the last call, in ascending order.
    pub fn drain_updated_registers(&mut self) -> Vec<u16> {
        let mut addresses = Vec::new();
        for (address, updated) in self.updated.iter_mut().enumerate() {
            if std::mem::take(updated) {
                addresses.push(address as u16);
            }
        }
        addresses
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}
