//! Hardware access for one sampling cycle.
//!
//! [`read_voltage`] opens a converter channel for a [`ChannelConfig`], runs a
//! single conversion and closes everything again before returning. Nothing
//! stays open between cycles, so an external bus reset only affects the read
//! in progress.

use crate::channel::ChannelConfig;
use crate::hw_trait::{AdcBus, HwError};
use crate::tracing::prelude::*;
use crate::types::Volts;

/// Errors from a single read
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// The bus session or converter could not be opened
    #[error("cannot open converter: {0}")]
    Open(#[source] HwError),

    /// The converter did not complete the conversion
    #[error("conversion failed: {0}")]
    Conversion(#[source] HwError),

    /// The driver returned something that is not a voltage
    #[error("converter returned invalid sample {0}")]
    InvalidSample(f64),
}

/// Read the channel once, truncated to millivolts.
///
/// The converter handle is dropped before this returns, on success and on
/// every error path.
pub async fn read_voltage(bus: &dyn AdcBus, config: &ChannelConfig) -> Result<Volts, ReadError> {
    let settings = config.settings();

    let mut channel = bus.open_channel(settings).await.map_err(ReadError::Open)?;
    let raw = channel
        .read_voltage()
        .await
        .map_err(ReadError::Conversion)?;
    drop(channel);

    if !raw.is_finite() {
        return Err(ReadError::InvalidSample(raw));
    }

    let volts = Volts(raw).truncate_to_millivolts();
    trace!(identity = %config.identity(), raw, volts = %volts, "Read");
    Ok(volts)
}
