//! RD53A pixel readout chip emulator.
//!
//! [`protocol`] encodes and decodes the command and data links,
//! [`emulator`] models the chip, and [`server`] exposes it over TCP.

pub mod config;
pub mod daemon;
pub mod emulator;
pub mod protocol;
pub mod server;
pub mod tracing;
