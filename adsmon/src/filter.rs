//! Change filter for published readings.
//!
//! A new reading is published only when it leaves a relative hysteresis band
//! around the last *published* value. The band is not re-centred on every
//! read, so slow drift accumulates until it crosses the band and is then
//! reported.
//!
//! The band is multiplicative. When the last published value is exactly
//! zero the band collapses to `[0, 0]` and any non-zero reading is admitted.
//! For negative values the bounds swap sides: `v * 1.05 < v * 0.95`, so
//! every reading outside `[1.05v, 0.95v]` is still admitted.

use crate::types::Volts;

/// Default relative hysteresis (5%)
pub const DEFAULT_THRESHOLD: f64 = 0.05;

/// Per-channel state owned by the sampling task.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SamplingState {
    last_published: Option<Volts>,
    available: bool,
}

impl SamplingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last value admitted by the filter, if any.
    pub fn last_published(&self) -> Option<Volts> {
        self.last_published
    }

    /// Whether the most recent read succeeded.
    pub fn is_available(&self) -> bool {
        self.available
    }

    pub(crate) fn set_available(&mut self, available: bool) {
        self.available = available;
    }
}

/// Relative hysteresis filter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChangeFilter {
    threshold: f64,
}

impl ChangeFilter {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Decide whether `value` is a reportable change.
    ///
    /// Returns true, and records `value` as the last published value, when
    /// nothing was published yet or when `value` lies strictly outside the
    /// band. Values on the band edge are rejected. State is left untouched
    /// on rejection.
    pub fn admit(&self, state: &mut SamplingState, value: Volts) -> bool {
        let admitted = match state.last_published {
            None => true,
            Some(last) => {
                let last = last.value();
                let upper = last * (1.0 + self.threshold);
                let lower = last * (1.0 - self.threshold);
                value.value() > upper || value.value() < lower
            }
        };

        if admitted {
            state.last_published = Some(value);
        }
        admitted
    }
}

impl Default for ChangeFilter {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}
