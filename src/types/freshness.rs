//! Timestamps and the "newer timestamp wins" replacement rule

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source-supplied point in time, in milliseconds since the Unix epoch.
///
/// This is the only ordering key used to compare snapshots, whatever their
/// source or accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Create a timestamp from epoch milliseconds.
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Epoch milliseconds.
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Self(millis)
    }

    /// Time elapsed from `earlier` to `self`, zero when `earlier` is not earlier.
    pub fn saturating_since(self, earlier: Timestamp) -> Duration {
        let delta = self.0.saturating_sub(earlier.0);
        Duration::from_millis(delta.max(0) as u64)
    }

    /// Shift forward by a duration.
    pub fn after(self, duration: Duration) -> Self {
        Self(self.0.saturating_add(i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Values ordered by a source-supplied timestamp.
pub trait Fresh {
    fn timestamp(&self) -> Timestamp;
}

/// Freshness rule: `incoming` replaces `held` iff nothing is held yet or its
/// timestamp is strictly greater. Ties keep the held value.
pub fn supersedes<T: Fresh>(held: Option<&T>, incoming: &T) -> bool {
    match held {
        None => true,
        Some(current) => incoming.timestamp() > current.timestamp(),
    }
}
