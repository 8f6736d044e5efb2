//! Locator configuration
//!
//! ```yaml
//! max_staleness_ms: 600000
//! staleness_basis: wall_clock
//! persist_last_location: true
//! delivery_rate:
//!   at_most_every_ms: 1000
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::types::DeliveryRate;
use crate::{LocationError, Result};

/// Default address staleness window (10 minutes).
pub const DEFAULT_MAX_STALENESS_MS: u64 = 10 * 60 * 1000;

/// Clock used to decide whether the held address is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalenessBasis {
    /// Compare against the system clock
    #[default]
    WallClock,

    /// Compare against the timestamp of the triggering location
    EventTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocatorConfig {
    /// Re-geocode once the held address is older than this
    pub max_staleness_ms: u64,

    pub staleness_basis: StalenessBasis,

    /// Save every accepted location to the store
    pub persist_last_location: bool,

    /// Rate used by [`LocationHandle::location_updates`](crate::LocationHandle::location_updates)
    pub delivery_rate: DeliveryRate,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            max_staleness_ms: DEFAULT_MAX_STALENESS_MS,
            staleness_basis: StalenessBasis::WallClock,
            persist_last_location: true,
            delivery_rate: DeliveryRate::Immediate,
        }
    }
}

impl LocatorConfig {
    pub fn max_staleness(&self) -> Duration {
        Duration::from_millis(self.max_staleness_ms)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: LocatorConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| LocationError::file_error(path.to_path_buf(), e))?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_staleness_ms == 0 {
            return Err(LocationError::config_error(
                "max_staleness_ms",
                "staleness window must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = LocatorConfig::default();
        assert_eq!(config.max_staleness(), Duration::from_secs(600));
        assert_eq!(config.staleness_basis, StalenessBasis::WallClock);
        assert!(config.persist_last_location);
        assert_eq!(config.delivery_rate, DeliveryRate::Immediate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = LocatorConfig::from_yaml_str("staleness_basis: event_time\n").unwrap();
        assert_eq!(config.staleness_basis, StalenessBasis::EventTime);
        assert_eq!(config.max_staleness_ms, DEFAULT_MAX_STALENESS_MS);
    }

    #[test]
    fn full_yaml() {
        let yaml = "max_staleness_ms: 1000\n\
                    persist_last_location: false\n\
                    delivery_rate:\n  at_most_every_ms: 250\n";
        let config = LocatorConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.max_staleness_ms, 1000);
        assert!(!config.persist_last_location);
        assert_eq!(config.delivery_rate, DeliveryRate::AtMostEveryMs(250));
    }

    #[test]
    fn zero_staleness_is_rejected() {
        let err = LocatorConfig::from_yaml_str("max_staleness_ms: 0\n").unwrap_err();
        assert!(matches!(err, LocationError::Config { .. }));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = LocatorConfig::from_yaml_str("max_stale: 5\n").unwrap_err();
        assert!(matches!(err, LocationError::Config { .. }));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = LocatorConfig::load("/nonexistent/locus.yaml").unwrap_err();
        match err {
            LocationError::File { path, .. } => assert!(path.ends_with("locus.yaml")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
