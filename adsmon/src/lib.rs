//! Sample ADS1115 converter channels over I2C and publish voltage changes.

pub mod adapter;
pub mod channel;
pub mod config;
pub mod daemon;
pub mod filter;
pub mod hw_trait;
pub mod peripheral;
pub mod publisher;
pub mod scheduler;
pub mod tracing;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;
