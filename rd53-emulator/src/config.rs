//! Emulator configuration.
//!
//! Parses environment variables to configure the chip model and the
//! network front end.

use std::net::SocketAddr;
use std::time::Duration;

use crate::emulator::{OutputMode, DEFAULT_SERVICE_INTERVAL};
use crate::tracing::prelude::*;

/// Default listen address of the daemon.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:5053";

/// Emulator configuration parsed from environment variables.
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    /// Address accepting command link connections.
    pub listen: SocketAddr,

    /// Chip ID the emulator answers to (0-7).
    pub chip_id: u8,

    pub output_mode: OutputMode,

    /// Frame slots between service frames (at least 1).
    pub service_interval: u32,

    /// Spread pixel thresholds around their nominal value.
    pub random_thresholds: bool,

    /// Add per-event noise to threshold comparisons.
    pub pixel_noise: bool,

    /// How often the daemon drains the command queue.
    pub process_period: Duration,

    /// Fixed PRNG seed, for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 5053)),
            chip_id: 0,
            output_mode: OutputMode::All,
            service_interval: DEFAULT_SERVICE_INTERVAL,
            random_thresholds: false,
            pixel_noise: false,
            process_period: Duration::from_millis(1),
            seed: None,
        }
    }
}

fn var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let value = std::env::var(name).ok()?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(var = name, value = %value, "Ignoring unparsable setting");
            None
        }
    }
}

fn flag(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => {
            warn!(var = name, value = %value, "Ignoring unparsable flag");
            None
        }
    }
}

fn output_mode(name: &str) -> Option<OutputMode> {
    let value = std::env::var(name).ok()?;
    let value = value.trim();
    let mode = match value.parse::<u8>() {
        Ok(n) => OutputMode::from_repr(n),
        Err(_) => value.parse().ok(),
    };
    if mode.is_none() {
        warn!(var = name, value = %value, "Ignoring unknown output mode");
    }
    mode
}

impl EmulatorConfig {
    /// Parse configuration from environment variables.
    ///
    /// Unset or unparsable variables keep their default.
    ///
    /// # Environment Variables
    ///
    /// - `RD53_LISTEN`: Listen address (default: 127.0.0.1:5053)
    /// - `RD53_CHIP_ID`: Chip ID (default: 0, clamped to 0-7)
    /// - `RD53_OUTPUT_MODE`: `all`, `data`, `service` or 0-2 (default: all)
    /// - `RD53_SERVICE_INTERVAL`: Frames between service frames (default: 10, at least 1)
    /// - `RD53_RANDOM_THRESHOLDS`: Randomize pixel thresholds (default: off)
    /// - `RD53_PIXEL_NOISE`: Add pixel noise (default: off)
    /// - `RD53_PROCESS_PERIOD_MS`: Queue processing period (default: 1, at least 1)
    /// - `RD53_SEED`: Fixed PRNG seed (default: reseed from the clock)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            listen: var("RD53_LISTEN").unwrap_or(defaults.listen),
            chip_id: var::<u8>("RD53_CHIP_ID")
                .unwrap_or(defaults.chip_id)
                .min(7),
            output_mode: output_mode("RD53_OUTPUT_MODE").unwrap_or(defaults.output_mode),
            service_interval: var::<u32>("RD53_SERVICE_INTERVAL")
                .unwrap_or(defaults.service_interval)
                .max(1),
            random_thresholds: flag("RD53_RANDOM_THRESHOLDS").unwrap_or(defaults.random_thresholds),
            pixel_noise: flag("RD53_PIXEL_NOISE").unwrap_or(defaults.pixel_noise),
            process_period: var::<u64>("RD53_PROCESS_PERIOD_MS")
                .map(|ms| Duration::from_millis(ms.max(1)))
                .unwrap_or(defaults.process_period),
            seed: var("RD53_SEED"),
        }
    }
}
