use adsmon::{config::DaemonConfig, daemon::Daemon, tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing::init_journald_or_stdout();

    let daemon = Daemon::new(DaemonConfig::from_env());
    daemon.run().await
}
