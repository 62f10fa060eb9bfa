// Interval - Millisecond value type
// Normalizes durations and absolute instants supplied as numbers or richer values

use std::fmt;
use std::time::Duration;

/// A span of time (or an absolute instant) in milliseconds.
///
/// Whether an `Interval` denotes a duration or a point in time depends on
/// the call site: `Repeater` intervals are durations, a `Sequence` start
/// time is an instant. Immutable; build a new one whenever a value changes.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Interval {
    ms: f64,
}

impl Interval {
    /// Create an interval from raw milliseconds
    pub fn from_ms(ms: f64) -> Self {
        Self { ms }
    }

    /// The raw millisecond value
    pub fn to_ms(&self) -> f64 {
        self.ms
    }
}

impl From<f64> for Interval {
    fn from(ms: f64) -> Self {
        Self::from_ms(ms)
    }
}

impl From<u64> for Interval {
    fn from(ms: u64) -> Self {
        Self::from_ms(ms as f64)
    }
}

impl From<u32> for Interval {
    fn from(ms: u32) -> Self {
        Self::from_ms(ms as f64)
    }
}

impl From<Duration> for Interval {
    fn from(duration: Duration) -> Self {
        Self::from_ms(duration.as_secs_f64() * 1000.0)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.ms)
    }
}
