//! Commands sent by the host on the command link.
//!
//! Every command except Trigger starts with a fixed 16-bit identifier.
//! The identifier is sent low byte first, except Sync which is sent as
//! `41 7E`. All bytes after the identifier are line-code symbols (see
//! [`super::symbol`]) carrying 5 bits each.

use bytes::{BufMut, BytesMut};
use std::fmt;

use super::error::{check_width, ProtocolError};
use super::symbol;

/// Chip IDs at or above this value address every chip on the link.
pub const BROADCAST_CHIP_ID: u8 = 8;

/// A decoded command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Event counter reset.
    Ecr,
    /// Bunch counter reset.
    Bcr,
    Noop,
    Sync,
    Pulse(Pulse),
    Cal(Cal),
    RdReg(RdReg),
    WrReg(WrReg),
    Trigger(Trigger),
}

const ECR_ID: [u8; 2] = [0x5A, 0x5A];
const BCR_ID: [u8; 2] = [0x59, 0x59];
const NOOP_ID: [u8; 2] = [0x69, 0x69];
const SYNC_ID: [u8; 2] = [0x41, 0x7E];

type Parser = fn(&[u8]) -> Result<(Command, usize), ProtocolError>;

/// Variant parsers in decode priority order.
///
/// Overlapping prefixes are resolved by this order, not by the data.
const PARSE_ORDER: [Parser; 9] = [
    Command::parse_cal,
    Command::parse_ecr,
    Command::parse_bcr,
    Command::parse_pulse,
    Command::parse_rdreg,
    Command::parse_wrreg,
    Command::parse_noop,
    Command::parse_sync,
    Command::parse_trigger,
];

impl Command {
    /// Number of bytes this command occupies on the wire.
    pub fn wire_len(&self) -> usize {
        match self {
            Command::Ecr | Command::Bcr | Command::Noop | Command::Sync => 2,
            Command::Pulse(_) => Pulse::LEN,
            Command::Cal(_) => Cal::LEN,
            Command::RdReg(_) => RdReg::LEN,
            Command::WrReg(wr) => wr.wire_len(),
            Command::Trigger(_) => Trigger::LEN,
        }
    }

    /// Chip ID carried by the command, if the variant has one.
    pub fn chip_id(&self) -> Option<u8> {
        match self {
            Command::Pulse(p) => Some(p.chip_id),
            Command::Cal(c) => Some(c.chip_id),
            Command::RdReg(r) => Some(r.chip_id),
            Command::WrReg(w) => Some(w.chip_id),
            Command::Ecr | Command::Bcr | Command::Noop | Command::Sync | Command::Trigger(_) => {
                None
            }
        }
    }

    /// Whether a chip configured with `chip_id` must execute this command.
    pub fn addresses(&self, chip_id: u8) -> bool {
        match self.chip_id() {
            None => true,
            Some(id) => id >= BROADCAST_CHIP_ID || id == chip_id,
        }
    }

    /// Append the wire encoding to `dst`, returning the bytes written.
    pub fn pack(&self, dst: &mut BytesMut) -> usize {
        let start = dst.len();
        match self {
            Command::Ecr => dst.put_slice(&ECR_ID),
            Command::Bcr => dst.put_slice(&BCR_ID),
            Command::Noop => dst.put_slice(&NOOP_ID),
            Command::Sync => dst.put_slice(&SYNC_ID),
            Command::Pulse(p) => p.pack(dst),
            Command::Cal(c) => c.pack(dst),
            Command::RdReg(r) => r.pack(dst),
            Command::WrReg(w) => w.pack(dst),
            Command::Trigger(t) => t.pack(dst),
        }
        dst.len() - start
    }

    /// Parse the command at the start of `src`.
    ///
    /// Variants are tried in priority order and the first match wins. On
    /// failure the most specific reason is returned: a truncated match is
    /// preferred over a corrupt payload, which is preferred over a plain
    /// identifier mismatch.
    pub fn try_unpack(src: &[u8]) -> Result<(Self, usize), ProtocolError> {
        let mut failure = ProtocolError::IdentifierMismatch;
        for parse in PARSE_ORDER {
            match parse(src) {
                Ok(parsed) => return Ok(parsed),
                Err(err) => {
                    if specificity(&err) > specificity(&failure) {
                        failure = err;
                    }
                }
            }
        }
        Err(failure)
    }

    fn parse_cal(src: &[u8]) -> Result<(Command, usize), ProtocolError> {
        let (cal, len) = Cal::try_unpack(src)?;
        Ok((Command::Cal(cal), len))
    }

    fn parse_ecr(src: &[u8]) -> Result<(Command, usize), ProtocolError> {
        expect_prefix(src, ECR_ID, 2)?;
        Ok((Command::Ecr, 2))
    }

    fn parse_bcr(src: &[u8]) -> Result<(Command, usize), ProtocolError> {
        expect_prefix(src, BCR_ID, 2)?;
        Ok((Command::Bcr, 2))
    }

    fn parse_pulse(src: &[u8]) -> Result<(Command, usize), ProtocolError> {
        let (pulse, len) = Pulse::try_unpack(src)?;
        Ok((Command::Pulse(pulse), len))
    }

    fn parse_rdreg(src: &[u8]) -> Result<(Command, usize), ProtocolError> {
        let (rd, len) = RdReg::try_unpack(src)?;
        Ok((Command::RdReg(rd), len))
    }

    fn parse_wrreg(src: &[u8]) -> Result<(Command, usize), ProtocolError> {
        let (wr, len) = WrReg::try_unpack(src)?;
        Ok((Command::WrReg(wr), len))
    }

    fn parse_noop(src: &[u8]) -> Result<(Command, usize), ProtocolError> {
        expect_prefix(src, NOOP_ID, 2)?;
        Ok((Command::Noop, 2))
    }

    fn parse_sync(src: &[u8]) -> Result<(Command, usize), ProtocolError> {
        expect_prefix(src, SYNC_ID, 2)?;
        Ok((Command::Sync, 2))
    }

    fn parse_trigger(src: &[u8]) -> Result<(Command, usize), ProtocolError> {
        let (trigger, len) = Trigger::try_unpack(src)?;
        Ok((Command::Trigger(trigger), len))
    }
}

fn specificity(err: &ProtocolError) -> u8 {
    match err {
        ProtocolError::IdentifierMismatch | ProtocolError::InvalidTriggerPattern(_) => 0,
        ProtocolError::Truncated { .. } => 2,
        _ => 1,
    }
}

/// Check the identifier at offset 0 and that `len` bytes are available.
fn expect_prefix(src: &[u8], id: [u8; 2], len: usize) -> Result<(), ProtocolError> {
    match src {
        [first, ..] if *first != id[0] => Err(ProtocolError::IdentifierMismatch),
        [] => Err(ProtocolError::IdentifierMismatch),
        [_, second, ..] if *second != id[1] => Err(ProtocolError::IdentifierMismatch),
        _ if src.len() < len => Err(ProtocolError::Truncated {
            need: len,
            have: src.len(),
        }),
        _ => Ok(()),
    }
}

/// Decode the symbol at `offset`.
fn data(src: &[u8], offset: usize) -> Result<u8, ProtocolError> {
    let byte = src[offset];
    symbol::decode(byte).ok_or(ProtocolError::InvalidSymbol { byte, offset })
}

fn put_symbol(dst: &mut BytesMut, value: u32) {
    dst.put_u8(symbol::encode((value & 0x1F) as u8));
}

/// Global pulse of `2^length` bunch crossings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse {
    pub chip_id: u8,
    pub length: u8,
}

impl Pulse {
    pub const ID: [u8; 2] = [0x5C, 0x5C];
    pub const LEN: usize = 4;

    pub fn new(chip_id: u8, length: u8) -> Result<Self, ProtocolError> {
        check_width("chip_id", chip_id.into(), 4)?;
        check_width("length", length.into(), 4)?;
        Ok(Self { chip_id, length })
    }

    fn pack(&self, dst: &mut BytesMut) {
        dst.put_slice(&Self::ID);
        put_symbol(dst, u32::from(self.chip_id & 0xF) << 1);
        put_symbol(dst, u32::from(self.length & 0xF) << 1);
    }

    pub fn try_unpack(src: &[u8]) -> Result<(Self, usize), ProtocolError> {
        expect_prefix(src, Self::ID, Self::LEN)?;
        let pulse = Self {
            chip_id: data(src, 2)? >> 1,
            length: data(src, 3)? >> 1,
        };
        Ok((pulse, Self::LEN))
    }
}

/// Calibration injection pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cal {
    pub chip_id: u8,
    pub edge_mode: bool,
    /// 3 bits.
    pub edge_delay: u8,
    /// 6 bits.
    pub edge_width: u8,
    pub aux_mode: bool,
    /// 5 bits.
    pub aux_delay: u8,
}

impl Cal {
    pub const ID: [u8; 2] = [0x63, 0x63];
    pub const LEN: usize = 6;

    pub fn new(
        chip_id: u8,
        edge_mode: bool,
        edge_delay: u8,
        edge_width: u8,
        aux_mode: bool,
        aux_delay: u8,
    ) -> Result<Self, ProtocolError> {
        check_width("chip_id", chip_id.into(), 4)?;
        check_width("edge_delay", edge_delay.into(), 3)?;
        check_width("edge_width", edge_width.into(), 6)?;
        check_width("aux_delay", aux_delay.into(), 5)?;
        Ok(Self {
            chip_id,
            edge_mode,
            edge_delay,
            edge_width,
            aux_mode,
            aux_delay,
        })
    }

    fn pack(&self, dst: &mut BytesMut) {
        let chip_id = u32::from(self.chip_id & 0xF);
        let edge_delay = u32::from(self.edge_delay & 0x7);
        let edge_width = u32::from(self.edge_width & 0x3F);
        dst.put_slice(&Self::ID);
        put_symbol(dst, chip_id << 1 | u32::from(self.edge_mode));
        put_symbol(dst, edge_delay << 2 | edge_width >> 4);
        put_symbol(dst, (edge_width & 0xF) << 1 | u32::from(self.aux_mode));
        put_symbol(dst, self.aux_delay.into());
    }

    pub fn try_unpack(src: &[u8]) -> Result<(Self, usize), ProtocolError> {
        expect_prefix(src, Self::ID, Self::LEN)?;
        let d2 = data(src, 2)?;
        let d3 = data(src, 3)?;
        let d4 = data(src, 4)?;
        let d5 = data(src, 5)?;
        let cal = Self {
            chip_id: d2 >> 1,
            edge_mode: d2 & 1 != 0,
            edge_delay: d3 >> 2,
            edge_width: (d3 & 0x3) << 4 | d4 >> 1,
            aux_mode: d4 & 1 != 0,
            aux_delay: d5,
        };
        Ok((cal, Self::LEN))
    }
}

/// Read request for one register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RdReg {
    pub chip_id: u8,
    /// 9 bits.
    pub address: u16,
}

impl RdReg {
    pub const ID: [u8; 2] = [0x65, 0x65];
    pub const LEN: usize = 6;

    pub fn new(chip_id: u8, address: u16) -> Result<Self, ProtocolError> {
        check_width("chip_id", chip_id.into(), 4)?;
        check_width("address", address.into(), 9)?;
        Ok(Self { chip_id, address })
    }

    fn pack(&self, dst: &mut BytesMut) {
        let address = u32::from(self.address & 0x1FF);
        dst.put_slice(&Self::ID);
        put_symbol(dst, u32::from(self.chip_id & 0xF) << 1);
        put_symbol(dst, address >> 4);
        put_symbol(dst, (address & 0xF) << 1);
        put_symbol(dst, 0);
    }

    pub fn try_unpack(src: &[u8]) -> Result<(Self, usize), ProtocolError> {
        expect_prefix(src, Self::ID, Self::LEN)?;
        let chip_id = data(src, 2)? >> 1;
        let address = u16::from(data(src, 3)?) << 4 | u16::from(data(src, 4)? >> 1);
        data(src, 5)?;
        Ok((Self { chip_id, address }, Self::LEN))
    }
}

/// Payload of a register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteData {
    /// One value, 8 bytes on the wire.
    Single(u16),
    /// Six values, 24 bytes on the wire.
    Sextuple([u16; 6]),
}

/// Register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrReg {
    pub chip_id: u8,
    /// 9 bits.
    pub address: u16,
    pub data: WriteData,
}

impl WrReg {
    pub const ID: [u8; 2] = [0x66, 0x66];
    pub const LEN: usize = 8;
    pub const EXTENDED_LEN: usize = 24;

    pub fn new(chip_id: u8, address: u16, value: u16) -> Result<Self, ProtocolError> {
        Self::with_data(chip_id, address, WriteData::Single(value))
    }

    pub fn with_data(chip_id: u8, address: u16, data: WriteData) -> Result<Self, ProtocolError> {
        check_width("chip_id", chip_id.into(), 4)?;
        check_width("address", address.into(), 9)?;
        Ok(Self {
            chip_id,
            address,
            data,
        })
    }

    /// Whether the six-value layout is used.
    pub fn is_extended(&self) -> bool {
        matches!(self.data, WriteData::Sextuple(_))
    }

    /// The value written by a single write, or the first of six.
    pub fn first_value(&self) -> u16 {
        match self.data {
            WriteData::Single(value) => value,
            WriteData::Sextuple(values) => values[0],
        }
    }

    pub fn values(&self) -> &[u16] {
        match &self.data {
            WriteData::Single(value) => std::slice::from_ref(value),
            WriteData::Sextuple(values) => values,
        }
    }

    pub fn wire_len(&self) -> usize {
        if self.is_extended() {
            Self::EXTENDED_LEN
        } else {
            Self::LEN
        }
    }

    fn pack(&self, dst: &mut BytesMut) {
        let address = u32::from(self.address & 0x1FF);
        let v0 = u32::from(self.first_value());
        dst.put_slice(&Self::ID);
        put_symbol(dst, u32::from(self.chip_id & 0xF) << 1 | u32::from(self.is_extended()));
        put_symbol(dst, address >> 4);
        put_symbol(dst, (address & 0xF) << 1 | v0 >> 15);
        put_symbol(dst, v0 >> 10);
        put_symbol(dst, v0 >> 5);
        put_symbol(dst, v0);

        if let WriteData::Sextuple(values) = self.data {
            // v1..v5 form one 80-bit string, five bits per symbol.
            let bits = values[1..]
                .iter()
                .fold(0u128, |acc, v| acc << 16 | u128::from(*v));
            for i in 0..16 {
                put_symbol(dst, (bits >> (75 - 5 * i)) as u32);
            }
        }
    }

    pub fn try_unpack(src: &[u8]) -> Result<(Self, usize), ProtocolError> {
        expect_prefix(src, Self::ID, Self::LEN)?;
        let d2 = data(src, 2)?;
        let d4 = data(src, 4)?;
        let chip_id = d2 >> 1;
        let extended = d2 & 1 != 0;
        let address = u16::from(data(src, 3)?) << 4 | u16::from(d4 >> 1);
        let v0 = u16::from(d4 & 1) << 15
            | u16::from(data(src, 5)?) << 10
            | u16::from(data(src, 6)?) << 5
            | u16::from(data(src, 7)?);

        if !extended {
            let wr = Self {
                chip_id,
                address,
                data: WriteData::Single(v0),
            };
            return Ok((wr, Self::LEN));
        }

        if src.len() < Self::EXTENDED_LEN {
            return Err(ProtocolError::Truncated {
                need: Self::EXTENDED_LEN,
                have: src.len(),
            });
        }

        let mut bits = 0u128;
        for offset in Self::LEN..Self::EXTENDED_LEN {
            bits = bits << 5 | u128::from(data(src, offset)?);
        }
        let mut values = [v0, 0, 0, 0, 0, 0];
        for (i, value) in values[1..].iter_mut().enumerate() {
            *value = (bits >> (64 - 16 * i)) as u16;
        }

        let wr = Self {
            chip_id,
            address,
            data: WriteData::Sextuple(values),
        };
        Ok((wr, Self::EXTENDED_LEN))
    }
}

/// Trigger patterns for bunch-crossing bitmaps 1 through 15.
const TRIGGER_PATTERNS: [u8; 15] = [
    0x2B, 0x2D, 0x2E, 0x33, 0x35, 0x36, 0x39, 0x3A, 0x3C, 0x4B, 0x4D, 0x4E, 0x53, 0x55, 0x56,
];

/// Trigger for up to four consecutive bunch crossings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    /// 4-bit bitmap, bit 3 is the first bunch crossing. Never zero.
    bunch_crossings: u8,
    /// 5 bits.
    tag: u8,
}

impl Trigger {
    pub const LEN: usize = 2;

    pub fn new(bunch_crossings: u8, tag: u8) -> Result<Self, ProtocolError> {
        check_width("bunch_crossings", bunch_crossings.into(), 4)?;
        if bunch_crossings == 0 {
            return Err(ProtocolError::FieldOutOfRange {
                field: "bunch_crossings",
                value: 0,
                max: 15,
            });
        }
        check_width("tag", tag.into(), 5)?;
        Ok(Self {
            bunch_crossings,
            tag,
        })
    }

    pub fn bunch_crossings(&self) -> u8 {
        self.bunch_crossings
    }

    pub fn tag(&self) -> u8 {
        self.tag
    }

    /// Whether the `n`th of the four bunch crossings (0 first) is triggered.
    pub fn fires_at(&self, n: usize) -> bool {
        n < 4 && self.bunch_crossings & (0x8 >> n) != 0
    }

    pub fn pattern(&self) -> u8 {
        TRIGGER_PATTERNS[usize::from(self.bunch_crossings) - 1]
    }

    fn pack(&self, dst: &mut BytesMut) {
        dst.put_u8(self.pattern());
        put_symbol(dst, self.tag.into());
    }

    pub fn try_unpack(src: &[u8]) -> Result<(Self, usize), ProtocolError> {
        let Some(&pattern) = src.first() else {
            return Err(ProtocolError::IdentifierMismatch);
        };
        let index = TRIGGER_PATTERNS
            .iter()
            .position(|p| *p == pattern)
            .ok_or(ProtocolError::InvalidTriggerPattern(pattern))?;
        if src.len() < Self::LEN {
            return Err(ProtocolError::Truncated {
                need: Self::LEN,
                have: src.len(),
            });
        }
        let trigger = Self {
            bunch_crossings: index as u8 + 1,
            tag: data(src, 1)?,
        };
        Ok((trigger, Self::LEN))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Ecr => write!(f, "ECR"),
            Command::Bcr => write!(f, "BCR"),
            Command::Noop => write!(f, "Noop"),
            Command::Sync => write!(f, "Sync"),
            Command::Pulse(p) => write!(f, "Pulse chip_id: {}, length: {}", p.chip_id, p.length),
            Command::Cal(c) => write!(
                f,
                "Cal chip_id: {}, edge_mode: {}, edge_delay: {}, edge_width: {}, aux_mode: {}, aux_delay: {}",
                c.chip_id,
                u8::from(c.edge_mode),
                c.edge_delay,
                c.edge_width,
                u8::from(c.aux_mode),
                c.aux_delay
            ),
            Command::RdReg(r) => {
                write!(f, "RdReg chip_id: {}, address: 0x{:03x}", r.chip_id, r.address)
            }
            Command::WrReg(w) => {
                write!(
                    f,
                    "WrReg chip_id: {}, mode: {}, address: 0x{:03x}, value:",
                    w.chip_id,
                    u8::from(w.is_extended()),
                    w.address
                )?;
                for value in w.values() {
                    write!(f, " 0x{:04x}", value)?;
                }
                Ok(())
            }
            Command::Trigger(t) => write!(
                f,
                "Trigger pattern: 0x{:02x}, bc: {:04b}, tag: {}",
                t.pattern(),
                t.bunch_crossings,
                t.tag
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn packed(command: &Command) -> Vec<u8> {
        let mut buf = BytesMut::new();
        let written = command.pack(&mut buf);
        assert_eq!(written, command.wire_len());
        assert_eq!(buf.len(), written);
        buf.to_vec()
    }

    fn assert_roundtrip(command: Command) {
        let bytes = packed(&command);
        let (decoded, consumed) = Command::try_unpack(&bytes).unwrap();
        assert_eq!(decoded, command, "bytes {:02x?}", bytes);
        assert_eq!(consumed, bytes.len());
    }

    #[test_case(Command::Ecr, &[0x5A, 0x5A]; "ecr")]
    #[test_case(Command::Bcr, &[0x59, 0x59]; "bcr")]
    #[test_case(Command::Noop, &[0x69, 0x69]; "noop")]
    #[test_case(Command::Sync, &[0x41, 0x7E]; "sync is sent high byte first")]
    fn fixed_commands(command: Command, expected: &[u8]) {
        assert_eq!(packed(&command), expected);
        assert_roundtrip(command);
    }

    #[test]
    fn rdreg_layout() {
        let rd = Command::RdReg(RdReg::new(3, 0x1A5).unwrap());
        // chip 3 -> 6, 0x1A5 >> 4 = 26, (0x5 << 1) = 10, 0
        assert_eq!(packed(&rd), [0x65, 0x65, 0x8D, 0xC9, 0x96, 0x6A]);
        assert_roundtrip(rd);
    }

    #[test]
    fn wrreg_single_layout() {
        let wr = Command::WrReg(WrReg::new(1, 0x00C, 0x8421).unwrap());
        let bytes = packed(&wr);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..2], &[0x66, 0x66]);
        assert_eq!(symbol::decode(bytes[2]), Some(2));
        // low address nibble 0xC shifted, top value bit set
        assert_eq!(symbol::decode(bytes[4]), Some(0x19));
        assert_eq!(symbol::decode(bytes[5]), Some(0x01));
        assert_eq!(symbol::decode(bytes[6]), Some(0x01));
        assert_eq!(symbol::decode(bytes[7]), Some(0x01));
        assert_roundtrip(wr);
    }

    #[test]
    fn wrreg_sextuple_roundtrip() {
        let values = [0xFFFF, 0x0001, 0x8000, 0x1234, 0xABCD, 0x5A5A];
        let wr = WrReg::with_data(15, 0x1FF, WriteData::Sextuple(values)).unwrap();
        let bytes = packed(&Command::WrReg(wr));
        assert_eq!(bytes.len(), 24);
        // second value starts right after the first six symbols
        assert_eq!(symbol::decode(bytes[8]), Some(0));
        assert_eq!(symbol::decode(bytes[10]), Some(0));
        assert_eq!(symbol::decode(bytes[11]), Some(0x10 | (0x8000 >> 12) as u8));
        assert_roundtrip(Command::WrReg(wr));
    }

    #[test]
    fn wrreg_extended_mode_without_enough_bytes_is_truncated() {
        let wr = WrReg::with_data(2, 0x20, WriteData::Sextuple([1, 2, 3, 4, 5, 6])).unwrap();
        let bytes = packed(&Command::WrReg(wr));

        let result = WrReg::try_unpack(&bytes[..8]);
        assert_eq!(
            result,
            Err(ProtocolError::Truncated { need: 24, have: 8 })
        );
        assert!(Command::try_unpack(&bytes[..8]).unwrap_err().is_truncated());
    }

    #[test]
    fn cal_roundtrip_keeps_every_field() {
        assert_roundtrip(Command::Cal(Cal::new(5, true, 6, 0x2B, true, 0x13).unwrap()));
        assert_roundtrip(Command::Cal(Cal::new(0, false, 0, 0x3F, false, 0).unwrap()));
        assert_roundtrip(Command::Cal(Cal::new(15, false, 7, 0x10, true, 31).unwrap()));
    }

    #[test]
    fn pulse_roundtrip() {
        for length in 0..16 {
            assert_roundtrip(Command::Pulse(Pulse::new(9, length).unwrap()));
        }
    }

    #[test]
    fn trigger_patterns_follow_bitmap() {
        let first = Trigger::new(0b0001, 0).unwrap();
        assert_eq!(first.pattern(), 0x2B);
        let last = Trigger::new(0b1111, 0).unwrap();
        assert_eq!(last.pattern(), 0x56);
        assert!(last.fires_at(0) && last.fires_at(3));
        assert!(first.fires_at(3) && !first.fires_at(0));

        for bitmap in 1..16 {
            for tag in [0, 17, 31] {
                assert_roundtrip(Command::Trigger(Trigger::new(bitmap, tag).unwrap()));
            }
        }
    }

    #[test]
    fn trigger_without_bunch_crossings_is_rejected() {
        assert!(Trigger::new(0, 3).is_err());
        assert!(Trigger::new(16, 3).is_err());
    }

    #[test_case(0b0001, 0x2B ; "last bunch crossing")]
    #[test_case(0b1000, 0x3A ; "first bunch crossing")]
    #[test_case(0b1111, 0x56 ; "all four")]
    fn trigger_pattern_follows_bunch_crossings(bunch_crossings: u8, pattern: u8) {
        let trigger = Trigger::new(bunch_crossings, 7).unwrap();
        assert_eq!(trigger.pattern(), pattern);
        assert_eq!(trigger.bunch_crossings(), bunch_crossings);
        assert_eq!(trigger.tag(), 7);

        let (decoded, _) = Trigger::try_unpack(&[pattern, crate::protocol::symbol::encode(7)]).unwrap();
        assert_eq!(decoded, trigger);
    }

    #[test]
    fn field_widths_are_enforced() {
        assert!(RdReg::new(16, 0).is_err());
        assert!(RdReg::new(0, 0x200).is_err());
        assert!(Cal::new(0, false, 8, 0, false, 0).is_err());
        assert!(Cal::new(0, false, 0, 64, false, 0).is_err());
        assert!(Pulse::new(0, 16).is_err());
    }

    #[test]
    fn invalid_symbol_fails_the_parse() {
        let err = Command::try_unpack(&[0x65, 0x65, 0x6A, 0x00, 0x6A, 0x6A]).unwrap_err();
        assert_eq!(err, ProtocolError::InvalidSymbol { byte: 0x00, offset: 3 });
    }

    #[test]
    fn partial_identifier_reports_truncation() {
        assert!(Command::try_unpack(&[0x5A]).unwrap_err().is_truncated());
        assert!(Command::try_unpack(&[0x66, 0x66, 0x6A]).unwrap_err().is_truncated());
        assert_eq!(
            Command::try_unpack(&[0xFF, 0x59]),
            Err(ProtocolError::IdentifierMismatch)
        );
        assert_eq!(Command::try_unpack(&[]), Err(ProtocolError::IdentifierMismatch));
    }

    #[test]
    fn chip_id_filtering() {
        let rd = |chip_id| Command::RdReg(RdReg::new(chip_id, 1).unwrap());
        assert!(rd(3).addresses(3));
        assert!(!rd(3).addresses(2));
        assert!(rd(8).addresses(0));
        assert!(rd(15).addresses(5));
        assert!(Command::Ecr.addresses(7));
        assert!(Command::Trigger(Trigger::new(1, 1).unwrap()).addresses(1));
    }

    #[test]
    fn display_lists_all_write_values() {
        let wr = Command::WrReg(WrReg::new(3, 0x1A, 0x0123).unwrap());
        assert_eq!(
            wr.to_string(),
            "WrReg chip_id: 3, mode: 0, address: 0x01a, value: 0x0123"
        );
    }
}
