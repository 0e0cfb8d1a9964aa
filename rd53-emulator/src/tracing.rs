//! Logging setup.
//!
//! Binaries call one of the `init_*` functions once at startup. Library
//! code uses `use crate::tracing::prelude::*` for the `trace!()` through
//! `error!()` macros.

use std::env;
use std::fmt::Write as _;
use time::OffsetDateTime;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{format::Writer, time::FormatTime},
    prelude::*,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

use prelude::*;

const CRATE_PREFIX: &str = "rd53_emulator::";

/// Log to journald when started by systemd, stdout otherwise.
pub fn init_journald_or_stdout() {
    if env::var("JOURNAL_STREAM").is_err() {
        init_stdout(LevelFilter::INFO);
        return;
    }
    match tracing_journald::layer() {
        Ok(layer) => tracing_subscriber::registry().with(layer).init(),
        Err(e) => {
            init_stdout(LevelFilter::INFO);
            error!("Failed to initialize journald logging, using stdout: {}", e);
        }
    }
}

/// Log to stdout at `default` level unless RUST_LOG says otherwise.
pub fn init_stdout(default: LevelFilter) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(default.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(LocalTimer)
                .fmt_fields(tracing_subscriber::fmt::format::DefaultFields::new())
                .event_format(TwoLineFormatter),
        )
        .init();
}

/// Target shown in log lines: our own modules without the crate prefix,
/// everything else untouched.
fn short_target(target: &str) -> &str {
    target.strip_prefix(CRATE_PREFIX).unwrap_or(target)
}

/// Message on the first line, structured fields dimmed on the second.
struct TwoLineFormatter;

#[derive(Default)]
struct FieldCollector {
    message: String,
    fields: String,
}

impl tracing::field::Visit for FieldCollector {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.push_field(field.name(), format_args!("{}", value));
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            self.push_field(field.name(), format_args!("{:?}", value));
        }
    }
}

impl FieldCollector {
    fn push_field(&mut self, name: &str, value: std::fmt::Arguments<'_>) {
        if name.starts_with("log.") {
            return;
        }
        if !self.fields.is_empty() {
            self.fields.push_str(", ");
        }
        let _ = write!(self.fields, "{}={}", name, value);
    }
}

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for TwoLineFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let mut visitor = FieldCollector::default();
        event.record(&mut visitor);

        LocalTimer.format_time(&mut writer)?;

        let (color, level) = match *event.metadata().level() {
            tracing::Level::ERROR => ("\x1b[31m", "ERROR"),
            tracing::Level::WARN => ("\x1b[33m", "WARN "),
            tracing::Level::INFO => ("\x1b[32m", "INFO "),
            tracing::Level::DEBUG => ("\x1b[34m", "DEBUG"),
            tracing::Level::TRACE => ("\x1b[35m", "TRACE"),
        };
        write!(
            writer,
            " {}{}\x1b[0m {}: {}",
            color,
            level,
            short_target(event.metadata().target()),
            visitor.message
        )?;

        if !visitor.fields.is_empty() {
            // Aligned under the target: "hh:mm:ss LEVEL ".
            write!(writer, "\n\x1b[90m{:15}{}\x1b[0m", "", visitor.fields)?;
        }

        writeln!(writer)
    }
}

/// Local wall-clock time to the second.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        write!(w, "{:02}:{:02}:{:02}", now.hour(), now.minute(), now.second())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_targets_are_shortened() {
        assert_eq!(short_target("rd53_emulator::server"), "server");
        assert_eq!(short_target("rd53_emulator::protocol::codec"), "protocol::codec");
        assert_eq!(short_target("tokio::net"), "tokio::net");
    }

    #[test]
    fn log_compat_fields_are_dropped() {
        let mut fields = FieldCollector::default();
        fields.push_field("log.target", format_args!("x"));
        fields.push_field("chip_id", format_args!("{}", 3));
        fields.push_field("mode", format_args!("{}", "all"));
        assert_eq!(fields.fields, "chip_id=3, mode=all");
    }
}
