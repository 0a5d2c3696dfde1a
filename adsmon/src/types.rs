//! Core types for adsmon.
//!
//! Values that cross module boundaries get a small newtype here so the unit
//! travels with the number.

use serde::Serialize;
use std::fmt;

/// A voltage reading, in volts.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize)]
#[serde(transparent)]
pub struct Volts(pub f64);

impl Volts {
    /// Get value in volts
    pub fn value(&self) -> f64 {
        self.0
    }

    /// Drop everything below one millivolt.
    ///
    /// Truncates toward zero rather than rounding, so `1.0009` becomes
    /// `1.000` and `-0.0019` becomes `-0.001`.
    pub fn truncate_to_millivolts(self) -> Self {
        Self((self.0 * 1000.0).trunc() / 1000.0)
    }
}

impl From<f64> for Volts {
    fn from(volts: f64) -> Self {
        Self(volts)
    }
}

impl From<Volts> for f64 {
    fn from(volts: Volts) -> Self {
        volts.0
    }
}

impl fmt::Display for Volts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}V", self.0)
    }
}
