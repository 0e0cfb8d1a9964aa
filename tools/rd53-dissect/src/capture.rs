//! Capture file loading.
//!
//! A capture is either raw link bytes or a hex dump: whitespace-separated
//! bytes, optionally prefixed with `0x`, with `#` starting a comment that
//! runs to the end of the line. Long hex runs without separators are split
//! into byte pairs.

use anyhow::{Context, Result};
use std::path::Path;

/// How the capture file stores its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CaptureFormat {
    Hex,
    Binary,
}

/// Load all link bytes from `path`.
pub fn read_capture(path: &Path, format: CaptureFormat) -> Result<Vec<u8>> {
    let raw = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    match format {
        CaptureFormat::Binary => Ok(raw),
        CaptureFormat::Hex => {
            let text = String::from_utf8(raw).context("Hex capture is not valid UTF-8")?;
            parse_hex(&text)
        }
    }
}

/// Parse a hex dump into bytes.
pub fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("");
        for token in line.split(|c: char| c.is_whitespace() || c == ',') {
            let digits = token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token);
            if digits.is_empty() {
                continue;
            }
            let decoded = hex::decode(digits)
                .with_context(|| format!("line {}: invalid hex {:?}", line_no + 1, token))?;
            bytes.extend(decoded);
        }
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_with_comments_and_prefixes() {
        let text = "# RdReg chip 3\n65 65 0x8D c9\n966a  # addr 0x1a5\n";
        assert_eq!(
            parse_hex(text).unwrap(),
            vec![0x65, 0x65, 0x8D, 0xC9, 0x96, 0x6A]
        );
    }

    #[test]
    fn test_parse_hex_rejects_garbage() {
        assert!(parse_hex("65 6").is_err());
        assert!(parse_hex("zz").is_err());
        assert!(parse_hex("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_hex_error_names_line() {
        let err = parse_hex("5a5a\n65 0xG1\n").unwrap_err();
        assert!(format!("{:#}", err).starts_with("line 2: invalid hex \"0xG1\""));
    }

    #[test]
    fn test_parse_hex_splits_long_runs() {
        assert_eq!(parse_hex("5A5a,6969").unwrap(), vec![0x5A, 0x5A, 0x69, 0x69]);
    }
}
