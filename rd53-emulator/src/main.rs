use rd53_emulator::{daemon::Daemon, tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing::init_journald_or_stdout();
    Daemon::new().run().await
}
