//! I2C hardware abstraction trait.

use async_trait::async_trait;
use super::Result;

/// I2C-specific errors
#[derive(Debug, thiserror::Error)]
pub enum I2cError {
    /// No acknowledgment from device
    #[error("No acknowledgment from device at address 0x{0:02x}")]
    NoAck(u8),

    /// Bus could not be opened
    #[error("Cannot open I2C bus {path}: {reason}")]
    Open { path: String, reason: String },

    /// Bus error
    #[error("Bus error")]
    BusError,

    /// Other I2C error
    #[error("I2C error: {0}")]
    Other(String),
}

/// I2C bus abstraction
#[async_trait]
pub trait I2c: Send + Sync {
    /// Write data to an I2C device.
    async fn write(&mut self, addr: u8, data: &[u8]) -> Result<()>;

    /// Write data then read from an I2C device (repeated start).
    async fn write_read(&mut self, addr: u8, write: &[u8], read: &mut [u8]) -> Result<()>;
}

#[async_trait]
impl<T: I2c + ?Sized> I2c for Box<T> {
    async fn write(&mut self, addr: u8, data: &[u8]) -> Result<()> {
        (**self).write(addr, data).await
    }

    async fn write_read(&mut self, addr: u8, write: &[u8], read: &mut [u8]) -> Result<()> {
        (**self).write_read(addr, write, read).await
    }
}

/// Source of I2C bus sessions.
///
/// Each call to [`I2cBus::open`] yields an independent session. Dropping the
/// session closes it, so nothing stays attached to the bus between uses.
#[async_trait]
pub trait I2cBus: Send + Sync {
    /// Open a new session on the bus.
    async fn open(&self) -> Result<Box<dyn I2c>>;

    /// Human-readable bus name for logs.
    fn name(&self) -> String;
}
