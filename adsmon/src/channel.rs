//! Channel configuration.
//!
//! A [`ChannelConfig`] says which converter input to sample and how: bus
//! address, measured pin, optional differential reference pin, gain and the
//! sampling period. The label each field accepts and the driver-level value
//! it maps to live in one static table per field, shared by every channel.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::hw_trait::adc::{ChannelSettings, InputLine};
use crate::tracing::prelude::*;

/// Sampling period used when a record does not give one, in seconds
pub const DEFAULT_UPDATE_INTERVAL: f64 = 0.5;

/// Configuration errors, reported to whoever attaches the channel
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Measured pin and differential reference are the same line
    #[error("pin {pin} and differential_pin {differential_pin} cannot be equal")]
    PinConflict {
        pin: Pin,
        differential_pin: DifferentialPin,
    },

    /// A channel with this address and pin is already attached
    #[error("channel {0} is already configured")]
    DuplicateIdentity(ChannelId),

    /// A label outside the field's valid set
    #[error("invalid {field} {value:?}")]
    UnknownLabel { field: &'static str, value: String },

    /// Non-positive or non-finite sampling period
    #[error("update_interval must be a positive number of seconds, got {0}")]
    InvalidInterval(f64),
}

/// Bus address, named after what the ADDR pin is strapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum Address {
    Gnd,
    Vdd,
    Sda,
    Scl,
}

/// Measured input line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum Pin {
    A0,
    A1,
    A2,
    A3,
}

/// Reference line for a differential measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum DifferentialPin {
    /// Single-ended: measure against ground
    Gnd,
    A0,
    A1,
    A2,
    A3,
}

/// Full-scale input range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum Gain {
    V6_144,
    V4_096,
    V2_048,
    V1_024,
    V0_512,
    V0_256,
}

// Tables are indexed by enum discriminant; keep entries in declaration order.

static ADDRESSES: [(Address, &str, u8); 4] = [
    (Address::Gnd, "0x48", 0x48),
    (Address::Vdd, "0x49", 0x49),
    (Address::Sda, "0x4A", 0x4A),
    (Address::Scl, "0x4B", 0x4B),
];

static PINS: [(Pin, &str, InputLine); 4] = [
    (Pin::A0, "A0", InputLine(0)),
    (Pin::A1, "A1", InputLine(1)),
    (Pin::A2, "A2", InputLine(2)),
    (Pin::A3, "A3", InputLine(3)),
];

static DIFFERENTIAL_PINS: [(DifferentialPin, &str, Option<InputLine>); 5] = [
    (DifferentialPin::Gnd, "GND", None),
    (DifferentialPin::A0, "A0", Some(InputLine(0))),
    (DifferentialPin::A1, "A1", Some(InputLine(1))),
    (DifferentialPin::A2, "A2", Some(InputLine(2))),
    (DifferentialPin::A3, "A3", Some(InputLine(3))),
];

static GAINS: [(Gain, &str, f64); 6] = [
    (Gain::V6_144, "6.144V", 2.0 / 3.0),
    (Gain::V4_096, "4.096V", 1.0),
    (Gain::V2_048, "2.048V", 2.0),
    (Gain::V1_024, "1.024V", 4.0),
    (Gain::V0_512, "0.512V", 8.0),
    (Gain::V0_256, "0.256V", 16.0),
];

fn parse_label<T: Copy, V>(
    table: &[(T, &'static str, V)],
    field: &'static str,
    label: &str,
) -> Result<T, ConfigError> {
    table
        .iter()
        .find(|(_, l, _)| *l == label)
        .map(|(value, _, _)| *value)
        .ok_or_else(|| ConfigError::UnknownLabel {
            field,
            value: label.to_string(),
        })
}

impl Address {
    pub const ALL: [Address; 4] = [Address::Gnd, Address::Vdd, Address::Sda, Address::Scl];

    pub fn label(self) -> &'static str {
        ADDRESSES[self as usize].1
    }

    /// 7-bit I2C address
    pub fn bus_address(self) -> u8 {
        ADDRESSES[self as usize].2
    }
}

impl Pin {
    pub const ALL: [Pin; 4] = [Pin::A0, Pin::A1, Pin::A2, Pin::A3];

    pub fn label(self) -> &'static str {
        PINS[self as usize].1
    }

    pub fn input_line(self) -> InputLine {
        PINS[self as usize].2
    }
}

impl DifferentialPin {
    pub const ALL: [DifferentialPin; 5] = [
        DifferentialPin::Gnd,
        DifferentialPin::A0,
        DifferentialPin::A1,
        DifferentialPin::A2,
        DifferentialPin::A3,
    ];

    pub fn label(self) -> &'static str {
        DIFFERENTIAL_PINS[self as usize].1
    }

    /// Reference line, or `None` for a single-ended read
    pub fn input_line(self) -> Option<InputLine> {
        DIFFERENTIAL_PINS[self as usize].2
    }

    /// The measured pin this reference names, if any.
    pub fn as_pin(self) -> Option<Pin> {
        match self {
            DifferentialPin::Gnd => None,
            DifferentialPin::A0 => Some(Pin::A0),
            DifferentialPin::A1 => Some(Pin::A1),
            DifferentialPin::A2 => Some(Pin::A2),
            DifferentialPin::A3 => Some(Pin::A3),
        }
    }
}

impl Gain {
    pub const ALL: [Gain; 6] = [
        Gain::V6_144,
        Gain::V4_096,
        Gain::V2_048,
        Gain::V1_024,
        Gain::V0_512,
        Gain::V0_256,
    ];

    pub fn label(self) -> &'static str {
        GAINS[self as usize].1
    }

    /// Converter gain multiplier for this range
    pub fn multiplier(self) -> f64 {
        GAINS[self as usize].2
    }
}

macro_rules! label_conversions {
    ($ty:ty, $table:ident, $field:literal) => {
        impl FromStr for $ty {
            type Err = ConfigError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_label(&$table, $field, s)
            }
        }

        impl TryFrom<String> for $ty {
            type Error = ConfigError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

label_conversions!(Address, ADDRESSES, "address");
label_conversions!(Pin, PINS, "pin");
label_conversions!(DifferentialPin, DIFFERENTIAL_PINS, "differential_pin");
label_conversions!(Gain, GAINS, "gain");

/// Stable identity of a logical sensor: address and pin, e.g. `0x48_A0`.
///
/// Two configurations with the same address and pin are the same sensor
/// whatever their gain or reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(address: Address, pin: Pin) -> Self {
        Self(format!("{}_{}", address.label(), pin.label()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn default_update_interval() -> f64 {
    DEFAULT_UPDATE_INTERVAL
}

/// Description of one sampled input.
///
/// Records arrive from configuration files or callers, so a value of this
/// type is not guaranteed valid; [`ChannelConfig::validate`] is run when a
/// channel is attached.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChannelConfig {
    /// Display name
    pub name: String,
    pub address: Address,
    pub pin: Pin,
    pub differential_pin: DifferentialPin,
    pub gain: Gain,
    /// Sampling period in seconds
    #[serde(default = "default_update_interval")]
    pub update_interval: f64,
}

impl ChannelConfig {
    /// Create a configuration with the default sampling period.
    pub fn new(
        name: impl Into<String>,
        address: Address,
        pin: Pin,
        differential_pin: DifferentialPin,
        gain: Gain,
    ) -> Self {
        Self {
            name: name.into(),
            address,
            pin,
            differential_pin,
            gain,
            update_interval: DEFAULT_UPDATE_INTERVAL,
        }
    }

    pub fn with_update_interval(mut self, seconds: f64) -> Self {
        self.update_interval = seconds;
        self
    }

    pub fn identity(&self) -> ChannelId {
        ChannelId::new(self.address, self.pin)
    }

    /// Fail if the measured pin is also the differential reference.
    pub fn check_pins(&self) -> Result<(), ConfigError> {
        if self.differential_pin.as_pin() == Some(self.pin) {
            return Err(ConfigError::PinConflict {
                pin: self.pin,
                differential_pin: self.differential_pin,
            });
        }
        Ok(())
    }

    /// Sampling period as a `Duration`.
    pub fn sampling_period(&self) -> Result<Duration, ConfigError> {
        if self.update_interval.is_nan() || self.update_interval <= 0.0 {
            return Err(ConfigError::InvalidInterval(self.update_interval));
        }
        Duration::try_from_secs_f64(self.update_interval)
            .ok()
            .filter(|period| !period.is_zero())
            .ok_or(ConfigError::InvalidInterval(self.update_interval))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.check_pins()?;
        self.sampling_period()?;
        Ok(())
    }

    /// Driver-level settings for this channel.
    pub fn settings(&self) -> ChannelSettings {
        ChannelSettings {
            address: self.address.bus_address(),
            input: self.pin.input_line(),
            reference: self.differential_pin.input_line(),
            gain: self.gain.multiplier(),
        }
    }

    /// Dump labels and the driver values they resolve to.
    pub fn log_settings(&self) {
        let settings = self.settings();
        debug!(
            identity = %self.identity(),
            address = %self.address,
            bus_address = %format_args!("0x{:02X}", settings.address),
            pin = %self.pin,
            input = %settings.input,
            differential_pin = %self.differential_pin,
            reference = ?settings.reference,
            gain = %self.gain,
            multiplier = settings.gain,
            update_interval = self.update_interval,
            "Channel settings"
        );
    }
}
