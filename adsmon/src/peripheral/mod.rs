//! Drivers for chips attached to the sampling bus.

pub mod ads1115;

pub use ads1115::{Ads1115, Ads1115Bus};
