//! Daemon lifecycle management for adsmon.
//!
//! Loads the channel file, starts a sampling task per channel, streams
//! sensor events to stdout, and shuts everything down on SIGINT or SIGTERM.

use std::sync::Arc;

use tokio::io::AsyncWrite;
use tokio::signal::unix::{self, SignalKind};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::tracing::prelude::*;
use crate::{
    config::{self, DaemonConfig},
    hw_trait::AdcBus,
    publisher::{self, ChannelPublisher},
    scheduler::Sampler,
};

/// The main daemon.
pub struct Daemon {
    config: DaemonConfig,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Daemon {
    /// Create a new daemon instance.
    pub fn new(config: DaemonConfig) -> Self {
        Self {
            config,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Token that stops the daemon when cancelled, as a signal would.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the daemon on the configured i2c-dev bus until shutdown is
    /// requested.
    #[cfg(feature = "linux-i2c")]
    pub async fn run(self) -> anyhow::Result<()> {
        use crate::hw_trait::I2cBus;
        use crate::peripheral::Ads1115Bus;
        use crate::transport::LinuxI2cBus;

        let i2c = LinuxI2cBus::new(&self.config.bus_path);
        info!(bus = %i2c.name(), "Using i2c-dev bus");
        self.serve(Arc::new(Ads1115Bus::new(i2c)), tokio::io::stdout())
            .await
    }

    #[cfg(not(feature = "linux-i2c"))]
    pub async fn run(self) -> anyhow::Result<()> {
        anyhow::bail!("built without the linux-i2c feature, no bus available")
    }

    /// Sample the configured channels on `bus`, writing events to `out`.
    pub async fn serve<W>(self, bus: Arc<dyn AdcBus>, out: W) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let channels = config::load_channels(&self.config.channels_path)?;
        if channels.is_empty() {
            warn!(
                path = %self.config.channels_path.display(),
                "No channels configured"
            );
        }

        let (publisher, events_rx) = ChannelPublisher::new(self.config.publish_buffer);
        let sampler = Sampler::new(bus, Arc::new(publisher));

        // Ends once the sampler, and with it the last publisher, is dropped
        self.tracker.spawn(async move {
            if let Err(e) = publisher::write_json_lines(events_rx, out).await {
                error!("Event sink error: {}", e);
            }
        });

        for channel in channels {
            let name = channel.name.clone();
            if let Err(e) = sampler.attach(channel) {
                error!(name = %name, "Rejected channel: {}", e);
            }
        }

        self.tracker.close();

        info!(channels = sampler.attached().len(), "Started.");
        info!("For debugging, set RUST_LOG=adsmon=debug or trace.");

        let mut sigint = unix::signal(SignalKind::interrupt())?;
        let mut sigterm = unix::signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT.");
            },
            _ = sigterm.recv() => {
                info!("Received SIGTERM.");
            },
            _ = self.shutdown.cancelled() => {
                info!("Shutdown requested.");
            },
        }

        sampler.shutdown().await;
        drop(sampler);

        self.tracker.wait().await;
        info!("Exiting.");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBus;
    use std::io::Write;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader};

    fn config_file(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_serve_streams_events_and_skips_rejected_channels() {
        let file = config_file(
            r#"{"channels": [
                {"name": "Battery", "address": "0x48", "pin": "A0",
                 "differential_pin": "GND", "gain": "4.096V", "update_interval": 60},
                {"name": "Duplicate", "address": "0x48", "pin": "A0",
                 "differential_pin": "GND", "gain": "2.048V", "update_interval": 60},
                {"name": "Conflict", "address": "0x49", "pin": "A1",
                 "differential_pin": "A1", "gain": "4.096V"}
            ]}"#,
        );
        let daemon = Daemon::new(DaemonConfig {
            channels_path: file.path().to_path_buf(),
            ..DaemonConfig::default()
        });
        let shutdown = daemon.shutdown_token();
        let bus = ScriptedBus::new([Ok(1.25)]);
        let (writer, reader) = tokio::io::duplex(4096);

        let run = tokio::spawn(daemon.serve(Arc::new(bus.clone()), writer));

        let mut lines = BufReader::new(reader).lines();
        let first: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        let second: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();

        assert_eq!(first["event"], "availability");
        assert_eq!(first["identity"], "0x48_A0");
        assert_eq!(first["available"], true);
        assert_eq!(second["event"], "measurement");
        assert_eq!(second["name"], "Battery");
        assert_eq!(second["value"], 1.25);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        // Only the first record was attached
        assert_eq!(bus.opened().len(), 1);
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_serve_fails_without_channel_file() {
        let dir = tempfile::tempdir().unwrap();
        let daemon = Daemon::new(DaemonConfig {
            channels_path: dir.path().join("missing.json"),
            ..DaemonConfig::default()
        });

        let result = daemon
            .serve(Arc::new(ScriptedBus::new([])), tokio::io::sink())
            .await;
        assert!(result.is_err());
    }
}
