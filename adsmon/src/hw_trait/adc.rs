//! ADC hardware abstraction trait.
//!
//! An [`AdcBus`] hands out [`AdcChannel`]s configured for one input line,
//! optional reference line and gain. A channel lives only as long as the
//! caller keeps it; all hardware it holds is released on drop.

use async_trait::async_trait;
use std::fmt;

use super::Result;

/// Converter input line selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputLine(pub u8);

impl fmt::Display for InputLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AIN{}", self.0)
    }
}

/// Driver-level settings for opening one converter channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelSettings {
    /// 7-bit I2C address of the converter
    pub address: u8,
    /// Line measured
    pub input: InputLine,
    /// Reference line; `None` measures against ground
    pub reference: Option<InputLine>,
    /// Converter gain multiplier (2/3, 1, 2, 4, 8 or 16)
    pub gain: f64,
}

/// A single readable converter channel
#[async_trait]
pub trait AdcChannel: Send {
    /// Perform one conversion and return the input voltage in volts.
    async fn read_voltage(&mut self) -> Result<f64>;
}

/// Something that can open converter channels on demand
#[async_trait]
pub trait AdcBus: Send + Sync {
    /// Open a bus session and converter handle for `settings`.
    async fn open_channel(&self, settings: ChannelSettings) -> Result<Box<dyn AdcChannel>>;
}
