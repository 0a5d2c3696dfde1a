//! Linux i2c-dev bus access.
//!
//! Opens `/dev/i2c-N` through `linux-embedded-hal`. Every session gets its
//! own file descriptor, closed when the session is dropped, so an external
//! bus reset between sessions is harmless.

use async_trait::async_trait;
use embedded_hal::i2c::{ErrorKind, I2c as HalI2c};
use linux_embedded_hal::I2cdev;
use std::path::PathBuf;

use crate::config::DEFAULT_BUS_PATH;
use crate::hw_trait::i2c::{I2c, I2cBus, I2cError};
use crate::hw_trait::{HwError, Result};
use crate::tracing::prelude::*;

/// An i2c-dev character device that can be opened on demand.
#[derive(Debug, Clone)]
pub struct LinuxI2cBus {
    path: PathBuf,
}

impl LinuxI2cBus {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for LinuxI2cBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_PATH)
    }
}

#[async_trait]
impl I2cBus for LinuxI2cBus {
    async fn open(&self) -> Result<Box<dyn I2c>> {
        let dev = I2cdev::new(&self.path).map_err(|e| I2cError::Open {
            path: self.path.display().to_string(),
            reason: format!("{:?}", e),
        })?;
        trace!("Opened {}", self.path.display());
        Ok(Box::new(LinuxI2c { dev }))
    }

    fn name(&self) -> String {
        self.path.display().to_string()
    }
}

/// One open session on an i2c-dev node.
///
/// Transfers are a handful of bytes, so the blocking ioctl runs inline on
/// the calling task.
pub struct LinuxI2c {
    dev: I2cdev,
}

#[async_trait]
impl I2c for LinuxI2c {
    async fn write(&mut self, addr: u8, data: &[u8]) -> Result<()> {
        HalI2c::write(&mut self.dev, addr, data).map_err(|e| map_error(addr, e))
    }

    async fn write_read(&mut self, addr: u8, write: &[u8], read: &mut [u8]) -> Result<()> {
        HalI2c::write_read(&mut self.dev, addr, write, read).map_err(|e| map_error(addr, e))
    }
}

fn map_error<E: embedded_hal::i2c::Error>(addr: u8, err: E) -> HwError {
    let err = match err.kind() {
        ErrorKind::NoAcknowledge(_) => I2cError::NoAck(addr),
        ErrorKind::Bus => I2cError::BusError,
        _ => I2cError::Other(format!("{:?}", err)),
    };
    err.into()
}
