//! Location snapshot value type

use serde::{Deserialize, Serialize};

use super::freshness::{Fresh, Timestamp};

/// Mean Earth radius used for great-circle distances, in metres.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Display flag attached to a location (e.g. a country code and its label).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagEntry {
    pub code: String,
    pub label: String,
}

impl FlagEntry {
    pub fn new(code: impl Into<String>, label: impl Into<String>) -> Self {
        Self { code: code.into(), label: label.into() }
    }
}

/// Immutable point-in-time position reported by one source.
///
/// Snapshots are never mutated once published; a newer snapshot replaces an
/// older one wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSnapshot {
    /// Identifier of the backend that produced the fix ("gps", "fused", ...).
    /// Persisted records write `/` as `_`, so names containing a slash come
    /// back altered after a restore.
    pub provider: String,

    /// Source-supplied fix time
    pub timestamp: Timestamp,

    pub latitude: f64,
    pub longitude: f64,

    /// Horizontal accuracy radius in metres
    pub accuracy: f32,

    /// Altitude in metres above WGS84
    pub altitude: f64,

    /// Ground speed in metres per second
    pub speed: f32,

    /// Ordered display flags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<FlagEntry>,
}

impl LocationSnapshot {
    /// Create a snapshot with zero accuracy, altitude and speed.
    pub fn new(
        provider: impl Into<String>,
        timestamp: Timestamp,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            provider: provider.into(),
            timestamp,
            latitude,
            longitude,
            accuracy: 0.0,
            altitude: 0.0,
            speed: 0.0,
            flags: Vec::new(),
        }
    }

    pub fn with_accuracy(mut self, accuracy: f32) -> Self {
        self.accuracy = accuracy;
        self
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = altitude;
        self
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_flags(mut self, flags: Vec<FlagEntry>) -> Self {
        self.flags = flags;
        self
    }

    /// Whether the coordinates describe a real point on the globe.
    pub fn has_valid_coordinates(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance to another snapshot in metres (haversine).
    pub fn distance_to(&self, other: &LocationSnapshot) -> f64 {
        distance_degrees(self.latitude, self.longitude, other.latitude, other.longitude)
    }

    /// `"lat,lon"` form used in map and search URLs.
    pub fn to_url_query(&self) -> String {
        format!("{},{}", self.latitude, self.longitude)
    }
}

impl Fresh for LocationSnapshot {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

/// Haversine distance in metres between two coordinates given in degrees.
pub fn distance_degrees(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1_rad.cos() * lat2_rad.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(lat: f64, lon: f64) -> LocationSnapshot {
        LocationSnapshot::new("test", Timestamp::from_millis(0), lat, lon)
    }

    #[test]
    fn distance_brussels_to_paris() {
        let brussels = at(50.8503, 4.3517);
        let paris = at(48.8566, 2.3522);
        let km = brussels.distance_to(&paris) / 1000.0;
        assert!((km - 264.0).abs() < 5.0, "got {km} km");
    }

    #[test]
    fn distance_to_self_is_zero() {
        let here = at(10.0, 10.0);
        assert_eq!(here.distance_to(&here), 0.0);
    }

    #[test]
    fn url_query_format() {
        assert_eq!(at(50.85, 4.35).to_url_query(), "50.85,4.35");
    }

    #[test]
    fn coordinate_validation() {
        assert!(at(90.0, -180.0).has_valid_coordinates());
        assert!(!at(90.1, 0.0).has_valid_coordinates());
        assert!(!at(0.0, 181.0).has_valid_coordinates());
        assert!(!at(f64::NAN, 0.0).has_valid_coordinates());
        assert!(!at(0.0, f64::INFINITY).has_valid_coordinates());
    }
}
