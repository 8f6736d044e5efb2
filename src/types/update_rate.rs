//! Delivery rate control for location streams

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How often a location stream may yield
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryRate {
    /// Every accepted location
    #[default]
    Immediate,

    /// At most one location per interval (milliseconds), latest wins.
    /// A zero interval behaves like `Immediate`.
    AtMostEveryMs(u64),
}

impl DeliveryRate {
    /// Rate limited to one item per `interval`. Intervals beyond `u64::MAX`
    /// milliseconds saturate.
    pub fn at_most_every(interval: Duration) -> Self {
        DeliveryRate::AtMostEveryMs(u64::try_from(interval.as_millis()).unwrap_or(u64::MAX))
    }

    /// Normalize degenerate intervals
    pub fn normalize(self) -> Self {
        match self {
            DeliveryRate::AtMostEveryMs(0) => DeliveryRate::Immediate,
            other => other,
        }
    }

    /// Get throttle interval if needed
    pub fn throttle_interval(self) -> Option<Duration> {
        match self.normalize() {
            DeliveryRate::Immediate => None,
            DeliveryRate::AtMostEveryMs(ms) => Some(Duration::from_millis(ms)),
        }
    }
}
