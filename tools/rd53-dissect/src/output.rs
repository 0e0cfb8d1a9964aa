//! Output formatting for dissected items.

use crate::dissect::{DissectedItem, ItemContent, Link, Summary};
use colored::Colorize;

/// Gray color for hex data output
const HEX_DATA_GRAY: (u8, u8, u8) = (128, 128, 128);

fn gray_hex(text: &str) -> colored::ColoredString {
    let (r, g, b) = HEX_DATA_GRAY;
    text.truecolor(r, g, b)
}

/// Output formatter configuration
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub show_raw_hex: bool,
    pub use_color: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            show_raw_hex: false,
            use_color: true,
        }
    }
}

fn link_label(link: Link, config: &OutputConfig) -> String {
    let (label, color) = match link {
        Link::Command => ("CMD → RD53A", colored::Color::BrightCyan),
        Link::Data => ("DATA ← RD53A", colored::Color::BrightYellow),
    };
    if config.use_color {
        label.color(color).to_string()
    } else {
        label.to_string()
    }
}

/// Format one dissected item as a line, plus hex lines if enabled.
pub fn format_item(item: &DissectedItem, link: Link, config: &OutputConfig) -> String {
    let content = match &item.content {
        ItemContent::Command(command) => command.to_string(),
        ItemContent::Frame(frame) => frame.to_string(),
        ItemContent::Skipped(reason) => {
            let text = format!("skipped {} byte(s): {}", item.raw_data.len(), reason);
            if config.use_color {
                text.red().to_string()
            } else {
                text
            }
        }
    };

    let mut result = format!(
        "{:08x} {}: {}",
        item.offset,
        link_label(link, config),
        content
    );

    if config.show_raw_hex && !item.raw_data.is_empty() {
        for line in format_hex_multiline(&item.raw_data).lines() {
            result.push_str("\n         ");
            if config.use_color {
                result.push_str(&gray_hex(line).to_string());
            } else {
                result.push_str(line);
            }
        }
    }

    result
}

pub fn format_summary(summary: &Summary, total_bytes: usize) -> String {
    format!(
        "{} item(s), {} of {} byte(s) skipped",
        summary.items, summary.skipped_bytes, total_bytes
    )
}

/// Format hex data with line wrapping at 16 bytes per line
fn format_hex_multiline(data: &[u8]) -> String {
    data.chunks(16)
        .map(|chunk| {
            chunk
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dissect::dissect;
    use test_case::test_case;

    fn plain(show_raw_hex: bool) -> OutputConfig {
        OutputConfig {
            show_raw_hex,
            use_color: false,
        }
    }

    #[test]
    fn test_command_line_without_color() {
        let items = dissect(Link::Command, &[0x5A, 0x5A]);
        assert_eq!(
            format_item(&items[0], Link::Command, &plain(false)),
            "00000000 CMD → RD53A: ECR"
        );
    }

    #[test]
    fn test_raw_hex_on_following_line() {
        let items = dissect(Link::Command, &[0x69, 0x69]);
        let text = format_item(&items[0], Link::Command, &plain(true));
        assert_eq!(text, "00000000 CMD → RD53A: Noop\n         69 69");
    }

    #[test_case(0, "" ; "empty")]
    #[test_case(3, "00 01 02" ; "short")]
    #[test_case(17, "00 01 02 03 04 05 06 07 08 09 0a 0b 0c 0d 0e 0f\n10" ; "wrapped")]
    fn test_hex_wrapping(len: u8, expected: &str) {
        let data: Vec<u8> = (0..len).collect();
        assert_eq!(format_hex_multiline(&data), expected);
    }

    #[test]
    fn test_skipped_bytes_reported() {
        let items = dissect(Link::Command, &[0x00]);
        let text = format_item(&items[0], Link::Command, &plain(false));
        assert!(text.starts_with("00000000 CMD → RD53A: skipped 1 byte(s): "));
    }
}
