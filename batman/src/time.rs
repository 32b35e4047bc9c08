//! Explicit time handling for the agent core.
//!
//! The core never reads a platform clock. All handlers receive the current
//! time through the [`Substrate`](crate::substrate::Substrate), which makes
//! event processing deterministic and lets a simulator drive the agent with a
//! virtual clock.

use core::ops::{Add, AddAssign, Sub};
use std::time::Duration;

/// A point in time, in milliseconds since an arbitrary host-defined epoch.
///
/// Wraps a u64 to enforce explicit unit conversions and to prevent mixing
/// points in time with durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The host epoch.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Create a timestamp from milliseconds since the epoch.
    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Timestamp(ms)
    }

    /// Create a timestamp from seconds since the epoch.
    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Timestamp(secs.saturating_mul(1000))
    }

    /// Milliseconds since the epoch.
    #[inline]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Time elapsed since `earlier`. Saturates to zero if `earlier` is in the
    /// future.
    #[inline]
    pub fn duration_since(self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0.saturating_add(rhs.as_millis() as u64))
    }
}

impl AddAssign<Duration> for Timestamp {
    #[inline]
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl Sub for Timestamp {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Timestamp) -> Duration {
        self.duration_since(rhs)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::Timestamp;

    #[test]
    fn duration_since_saturates() {
        let t1 = Timestamp::from_secs(5);
        let t2 = Timestamp::from_secs(7);
        assert_eq!(t2.duration_since(t1), Duration::from_secs(2));
        assert_eq!(t1.duration_since(t2), Duration::ZERO);
    }

    #[test]
    fn add_duration() {
        let t = Timestamp::from_millis(1500) + Duration::from_millis(700);
        assert_eq!(t.as_millis(), 2200);

        let mut t = Timestamp::ZERO;
        t += Duration::from_secs(3);
        assert_eq!(t, Timestamp::from_secs(3));
    }
}
