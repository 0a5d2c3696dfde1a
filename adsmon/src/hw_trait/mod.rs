//! Hardware abstraction layer traits.
//!
//! This module defines the hardware interface traits (I2C bus sessions and
//! ADC channels) that let the sampling code work against different underlying
//! implementations, whether a Linux i2c-dev node or an in-memory fake.

pub mod adc;
pub mod i2c;

// Re-export traits
pub use adc::{AdcBus, AdcChannel, ChannelSettings, InputLine};
pub use i2c::{I2c, I2cBus, I2cError};

/// Common error type for hardware operations
#[derive(Debug, thiserror::Error)]
pub enum HwError {
    /// I2C bus level failure
    #[error(transparent)]
    I2c(#[from] I2cError),

    /// Invalid parameter or argument
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Timeout waiting for hardware response
    #[error("Hardware timeout")]
    Timeout,

    /// Other hardware-specific error
    #[error("Hardware error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, HwError>;
