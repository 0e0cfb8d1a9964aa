//! RD53A link capture dissector.

mod capture;
mod dissect;
mod output;

use anyhow::{Context, Result};
use capture::{read_capture, CaptureFormat};
use clap::Parser;
use dissect::{dissect, summarize, Link};
use output::{format_item, format_summary, OutputConfig};
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;

/// Protocol dissector for RD53A command and data link captures
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Capture file
    input: PathBuf,

    /// Link the capture was taken on
    #[arg(short = 'l', long, value_enum, default_value = "data")]
    link: Link,

    /// Capture file format
    #[arg(short = 'f', long, value_enum, default_value = "hex")]
    format: CaptureFormat,

    /// Show raw hex data for each item
    #[arg(short = 'x', long)]
    hex: bool,

    /// Output file (default: stdout)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Enable debug logging
    #[arg(short = 'd', long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug {
        rd53_emulator::tracing::init_stdout(LevelFilter::DEBUG);
    }

    let data = read_capture(&args.input, args.format)
        .with_context(|| format!("Failed to load capture: {:?}", args.input))?;

    let config = OutputConfig {
        show_raw_hex: args.hex,
        use_color: !args.no_color && args.output.is_none() && std::io::stdout().is_terminal(),
    };

    let items = dissect(args.link, &data);
    let summary = summarize(&items);

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(
            std::fs::File::create(path)
                .with_context(|| format!("Failed to create output file: {:?}", path))?,
        ),
        None => Box::new(std::io::stdout().lock()),
    };

    for item in &items {
        writeln!(out, "{}", format_item(item, args.link, &config))?;
    }
    writeln!(out, "{}", format_summary(&summary, data.len()))?;

    Ok(())
}
