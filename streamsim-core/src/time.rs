//! Simulation time in microsecond resolution.

use std::fmt;
use std::ops::Add;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Absolute simulation instant, measured in microseconds since simulation start.
///
/// The simulation clock is monotonic, so instants are unsigned. Differences
/// that may go negative (availability delays) are computed with
/// [`SimTime::signed_micros_until`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SimTime(u64);

impl SimTime {
    /// Simulation start.
    pub const ZERO: SimTime = SimTime(0);

    /// Creates instant from microseconds since simulation start.
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Creates instant from whole seconds since simulation start.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs * 1_000_000)
    }

    /// Returns microseconds since simulation start.
    pub const fn as_micros(self) -> u64 {
        self.0
    }

    /// Returns seconds since simulation start as float, for log output.
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Returns the duration elapsed since `earlier`, zero if `earlier` is later.
    pub fn saturating_duration_since(self, earlier: SimTime) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }

    /// Signed microseconds from `self` until `target`. Negative when `target` is in the past.
    pub fn signed_micros_until(self, target: SimTime) -> i64 {
        target.0 as i64 - self.0 as i64
    }
}

impl Add<Duration> for SimTime {
    type Output = SimTime;

    fn add(self, rhs: Duration) -> SimTime {
        SimTime(self.0.saturating_add(duration_micros(rhs)))
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}

/// Converts a duration to whole microseconds, saturating at `u64::MAX`.
pub fn duration_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_delay_can_be_negative() {
        let now = SimTime::from_secs(5);
        assert_eq!(now.signed_micros_until(SimTime::from_secs(2)), -3_000_000);
        assert_eq!(now.signed_micros_until(SimTime::from_secs(7)), 2_000_000);
    }

    #[test]
    fn test_saturating_duration_since() {
        let a = SimTime::from_micros(1_500);
        let b = SimTime::from_micros(500);
        assert_eq!(a.saturating_duration_since(b), Duration::from_micros(1_000));
        assert_eq!(b.saturating_duration_since(a), Duration::ZERO);
    }

    #[test]
    fn test_display_uses_six_decimals() {
        assert_eq!(SimTime::from_micros(2_000_001).to_string(), "2.000001s");
    }
}
