//! Line-code symbols used by every command payload byte.
//!
//! Each symbol is an 8-bit DC-balanced word that carries 5 bits of data.
//! The mapping is a bijection between 0..=31 and the 32 bytes below; every
//! other byte is corrupt payload.

/// Symbol for each 5-bit data value.
const DATA_TO_SYMBOL: [u8; 32] = [
    0x6A, 0x6C, 0x71, 0x72, 0x74, 0x8B, 0x8D, 0x8E, //
    0x93, 0x95, 0x96, 0x99, 0x9A, 0x9C, 0xA3, 0xA5, //
    0xA6, 0xA9, 0xAA, 0xAC, 0xB1, 0xB2, 0xB4, 0xC3, //
    0xC5, 0xC6, 0xC9, 0xCA, 0xCC, 0xD1, 0xD2, 0xD4, //
];

const INVALID: u8 = 0xFF;

/// Data value for each byte, `INVALID` where the byte is not a symbol.
static SYMBOL_TO_DATA: [u8; 256] = {
    let mut table = [INVALID; 256];
    let mut data = 0;
    while data < DATA_TO_SYMBOL.len() {
        table[DATA_TO_SYMBOL[data] as usize] = data as u8;
        data += 1;
    }
    table
};

/// Largest value a symbol can carry.
pub const MAX_DATA: u8 = 31;

/// Encode a 5-bit value as its symbol.
///
/// Only the low five bits of `value` are used; callers mask their fields
/// before encoding.
pub const fn encode(value: u8) -> u8 {
    DATA_TO_SYMBOL[(value & MAX_DATA) as usize]
}

/// Decode a symbol back to its 5-bit value, or `None` if `byte` is not a
/// legal symbol.
pub const fn decode(byte: u8) -> Option<u8> {
    match SYMBOL_TO_DATA[byte as usize] {
        INVALID => None,
        data => Some(data),
    }
}

/// Whether `byte` is one of the legal symbols.
pub const fn is_symbol(byte: u8) -> bool {
    decode(byte).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn every_value_survives_the_line_code() {
        for value in 0..=MAX_DATA {
            assert_eq!(decode(encode(value)), Some(value), "value {}", value);
        }
    }

    #[test]
    fn symbols_are_distinct_and_balanced() {
        let mut seen = std::collections::HashSet::new();
        for symbol in DATA_TO_SYMBOL {
            assert!(seen.insert(symbol), "duplicate symbol 0x{:02x}", symbol);
            assert_eq!(symbol.count_ones(), 4, "symbol 0x{:02x} unbalanced", symbol);
        }
    }

    #[test]
    fn exactly_the_symbol_set_decodes() {
        let legal = (0..=255u8).filter(|b| is_symbol(*b)).count();
        assert_eq!(legal, DATA_TO_SYMBOL.len());
    }

    #[test_case(0x00; "zero")]
    #[test_case(0xFF; "all ones")]
    #[test_case(0x5A; "command identifier")]
    #[test_case(0xB6; "unbalanced neighbour of data 22")]
    #[test_case(0x1E; "blank filler")]
    fn non_symbols_are_rejected(byte: u8) {
        assert_eq!(decode(byte), None);
    }

    #[test_case(0, 0x6A)]
    #[test_case(22, 0xB4)]
    #[test_case(31, 0xD4)]
    fn known_symbols(value: u8, symbol: u8) {
        assert_eq!(encode(value), symbol);
    }
}
