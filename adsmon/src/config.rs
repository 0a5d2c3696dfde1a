//! Daemon configuration.
//!
//! Runtime settings come from environment variables. The channel list lives
//! in a JSON file of the form `{"channels": [ ... ]}` where each entry is a
//! [`ChannelConfig`] record.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::channel::ChannelConfig;
use crate::tracing::prelude::*;

pub const CONFIG_PATH_VAR: &str = "ADSMON_CONFIG";
pub const BUS_PATH_VAR: &str = "ADSMON_I2C_BUS";
pub const PUBLISH_BUFFER_VAR: &str = "ADSMON_PUBLISH_BUFFER";

pub const DEFAULT_CONFIG_PATH: &str = "/etc/adsmon/channels.json";
/// Bus on a Raspberry Pi header (GPIO2/GPIO3)
pub const DEFAULT_BUS_PATH: &str = "/dev/i2c-1";
pub const DEFAULT_PUBLISH_BUFFER: usize = 64;

/// Daemon configuration parsed from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    /// JSON file listing the channels to sample.
    pub channels_path: PathBuf,

    /// I2C character device the converters sit on.
    pub bus_path: PathBuf,

    /// Depth of the queue between the sampling tasks and the event sink.
    /// Events are dropped once it is full.
    pub publish_buffer: usize,
}

impl DaemonConfig {
    /// Parse configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `ADSMON_CONFIG`: channel file (default: `/etc/adsmon/channels.json`)
    /// - `ADSMON_I2C_BUS`: bus device (default: `/dev/i2c-1`)
    /// - `ADSMON_PUBLISH_BUFFER`: publish queue depth (default: 64, at least 1)
    pub fn from_env() -> Self {
        let channels_path = std::env::var_os(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let bus_path = std::env::var_os(BUS_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BUS_PATH));

        let publish_buffer = match std::env::var(PUBLISH_BUFFER_VAR) {
            Ok(value) => value.parse::<usize>().unwrap_or_else(|_| {
                warn!(value = %value, "Ignoring invalid {}", PUBLISH_BUFFER_VAR);
                DEFAULT_PUBLISH_BUFFER
            }),
            Err(_) => DEFAULT_PUBLISH_BUFFER,
        }
        .max(1);

        Self {
            channels_path,
            bus_path,
            publish_buffer,
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            channels_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            bus_path: PathBuf::from(DEFAULT_BUS_PATH),
            publish_buffer: DEFAULT_PUBLISH_BUFFER,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed channel file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct ChannelFile {
    channels: Vec<serde_json::Value>,
}

/// Read the channel file at `path`.
pub fn load_channels(path: &Path) -> Result<Vec<ChannelConfig>, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_channels(&text)
}

/// Parse channel records.
///
/// The file as a whole must be well formed. A single record with a missing
/// field or an unknown label is logged and skipped so the remaining
/// channels still start.
pub fn parse_channels(text: &str) -> Result<Vec<ChannelConfig>, LoadError> {
    let file: ChannelFile = serde_json::from_str(text)?;

    let mut channels = Vec::with_capacity(file.channels.len());
    for (index, record) in file.channels.into_iter().enumerate() {
        match serde_json::from_value::<ChannelConfig>(record) {
            Ok(config) => channels.push(config),
            Err(e) => warn!(index, "Skipping channel record: {}", e),
        }
    }
    Ok(channels)
}
