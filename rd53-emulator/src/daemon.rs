//! Daemon lifecycle management for rd53-emulator.
//!
//! Starts the TCP front end, waits for a termination signal and shuts
//! everything down.

use tokio::signal::unix::{self, SignalKind};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::config::EmulatorConfig;
use crate::server;
use crate::tracing::prelude::*;

/// The main daemon.
pub struct Daemon {
    config: EmulatorConfig,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Daemon {
    /// Create a daemon configured from the environment.
    pub fn new() -> Self {
        Self::with_config(EmulatorConfig::from_env())
    }

    pub fn with_config(config: EmulatorConfig) -> Self {
        Self {
            config,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Run the daemon until shutdown is requested.
    pub async fn run(self) -> anyhow::Result<()> {
        info!(
            listen = %self.config.listen,
            chip_id = self.config.chip_id,
            mode = %self.config.output_mode,
            service_interval = self.config.service_interval,
            random_thresholds = self.config.random_thresholds,
            pixel_noise = self.config.pixel_noise,
            "Configuration"
        );

        self.tracker.spawn({
            let config = self.config.clone();
            let shutdown = self.shutdown.clone();
            async move {
                if let Err(e) = server::serve(config, shutdown.clone()).await {
                    error!("Server error: {:#}", e);
                    // Nothing left to do without the front end.
                    shutdown.cancel();
                }
            }
        });

        self.tracker.close();

        info!("Started.");
        info!("For debugging, set RUST_LOG=rd53_emulator=debug or trace.");

        // Install signal handlers
        let mut sigint = unix::signal(SignalKind::interrupt())?;
        let mut sigterm = unix::signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT.");
            },
            _ = sigterm.recv() => {
                info!("Received SIGTERM.");
            },
            _ = self.shutdown.cancelled() => {},
        }

        self.shutdown.cancel();
        self.tracker.wait().await;
        info!("Exiting.");

        Ok(())
    }
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}
