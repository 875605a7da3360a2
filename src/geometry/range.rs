//! Closed numeric interval filter for point attributes.

use serde::{Deserialize, Serialize};

/// Attribute filter over a closed `[min, max]` interval.
///
/// A disabled range matches every value, which lets a predicate bundle carry
/// one `Range` per filterable attribute without special-casing "no filter".
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Range {
    min: f64,
    max: f64,
    enabled: bool,
}

impl Default for Range {
    fn default() -> Self {
        Range {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
            enabled: false,
        }
    }
}

impl Range {
    pub fn new(a: f64, b: f64) -> Self {
        Range {
            min: a.min(b),
            max: a.max(b),
            enabled: true,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        !self.enabled || (value >= self.min && value <= self.max)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
