//! Physical bus access.
//!
//! Implementations of [`crate::hw_trait::I2cBus`] for real hardware.

#[cfg(feature = "linux-i2c")]
pub mod i2c_dev;

#[cfg(feature = "linux-i2c")]
pub use i2c_dev::LinuxI2cBus;
