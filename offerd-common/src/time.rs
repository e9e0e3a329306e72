use std::{
    fmt,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

/// The number of whole seconds since the [`UNIX_EPOCH`].
///
/// The BOLT12 wire format expresses absolute times (offer expiries,
/// recurrence base times) in unix seconds, so this is the resolution used
/// throughout the offers subsystem.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize,
    Deserialize,
)]
pub struct TimestampSecs(u64);

impl TimestampSecs {
    pub const MAX: Self = Self(u64::MAX);

    /// Creates a new [`TimestampSecs`] from the current [`SystemTime`].
    ///
    /// Panics if the current time is before the unix epoch.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Current time is before January 1st, 1970")
            .as_secs();
        Self(secs)
    }

    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    #[inline]
    pub const fn as_secs(self) -> u64 {
        self.0
    }

    pub const fn saturating_add(self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration.as_secs()))
    }
}

impl fmt::Display for TimestampSecs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<u64> for TimestampSecs {
    #[inline]
    fn from(secs: u64) -> Self {
        Self(secs)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn now_is_sane() {
        // 2020-01-01T00:00:00Z
        assert!(TimestampSecs::now() > TimestampSecs::from_secs(1_577_836_800));
        assert!(TimestampSecs::now() < TimestampSecs::MAX);
    }

    #[test]
    fn ordering() {
        let t0 = TimestampSecs::from_secs(100);
        let t1 = t0.saturating_add(Duration::from_secs(50));
        assert!(t0 < t1);
        assert_eq!(t1.as_secs(), 150);
    }
}
