//! Text record format for persisted locations
//!
//! A location is stored as one slash-delimited line:
//!
//! ```text
//! v1/<provider>/<epoch-millis>/<lat>/<lon>/<accuracy>/<altitude>/<speed>
//! ```
//!
//! Floating point fields always carry a fractional part (`5.0`, `50.85`).
//! Anything that does not decode cleanly is treated by callers as "no stored
//! location".

use tracing::debug;

use crate::types::{LocationSnapshot, Timestamp};
use crate::{LocationError, Result};

/// Version tag written as the first field.
pub const RECORD_VERSION: &str = "v1";

const FIELD_COUNT: usize = 8;

/// Encode a snapshot. A `/` in the provider name is written as `_`, so
/// such names do not survive a round trip unchanged.
pub fn encode_location(location: &LocationSnapshot) -> String {
    let provider = location.provider.replace('/', "_");
    format!(
        "{}/{}/{}/{:?}/{:?}/{:?}/{:?}/{:?}",
        RECORD_VERSION,
        provider,
        location.timestamp.as_millis(),
        location.latitude,
        location.longitude,
        location.accuracy,
        location.altitude,
        location.speed,
    )
}

/// Encode an optional snapshot; `None` is stored as an empty string.
pub fn encode_optional(location: Option<&LocationSnapshot>) -> String {
    location.map(encode_location).unwrap_or_default()
}

/// Decode a record, reporting why it was rejected.
pub fn decode_location(record: &str) -> Result<LocationSnapshot> {
    let fields: Vec<&str> = record.split('/').collect();

    if fields.len() != FIELD_COUNT {
        return Err(LocationError::malformed_record(format!(
            "expected {} fields, found {}",
            FIELD_COUNT,
            fields.len()
        )));
    }

    if fields[0] != RECORD_VERSION {
        return Err(LocationError::malformed_record(format!(
            "unsupported version tag '{}'",
            fields[0]
        )));
    }

    let millis: i64 = parse_field(fields[2], "timestamp")?;
    let latitude: f64 = parse_field(fields[3], "latitude")?;
    let longitude: f64 = parse_field(fields[4], "longitude")?;
    let accuracy: f32 = parse_field(fields[5], "accuracy")?;
    let altitude: f64 = parse_field(fields[6], "altitude")?;
    let speed: f32 = parse_field(fields[7], "speed")?;

    let location = LocationSnapshot::new(fields[1], Timestamp::from_millis(millis), latitude, longitude)
        .with_accuracy(accuracy)
        .with_altitude(altitude)
        .with_speed(speed);

    if !location.has_valid_coordinates() {
        return Err(LocationError::malformed_record(format!(
            "coordinates out of range ({}, {})",
            latitude, longitude
        )));
    }

    Ok(location)
}

/// Decode a stored record, mapping empty or malformed input to `None`.
pub fn restore_location(record: Option<&str>) -> Option<LocationSnapshot> {
    let record = record?.trim();
    if record.is_empty() {
        return None;
    }

    match decode_location(record) {
        Ok(location) => Some(location),
        Err(e) => {
            debug!("Ignoring stored location: {}", e);
            None
        }
    }
}

fn parse_field<T: std::str::FromStr>(raw: &str, name: &str) -> Result<T> {
    raw.parse::<T>()
        .map_err(|_| LocationError::malformed_record(format!("invalid {} '{}'", name, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> LocationSnapshot {
        LocationSnapshot::new("gps", Timestamp::from_millis(1000), 50.85, 4.35)
            .with_accuracy(5.0)
            .with_altitude(100.0)
            .with_speed(0.0)
    }

    #[test]
    fn encodes_with_fractional_parts() {
        assert_eq!(encode_location(&sample()), "v1/gps/1000/50.85/4.35/5.0/100.0/0.0");
    }

    #[test]
    fn round_trip_restores_every_field() {
        let original = sample();
        let restored = decode_location(&encode_location(&original)).unwrap();

        assert_eq!(restored, original);
        // Longitude must come from its own field, not a second copy of latitude
        assert_eq!(restored.longitude, 4.35);
    }

    #[test]
    fn wrong_field_count_is_absent() {
        assert_eq!(restore_location(Some("v1/gps/1000/50.85/4.35/5.0/100.0")), None);
        assert_eq!(restore_location(Some("v1/gps/1000/50.85/4.35/5.0/100.0/0.0/9")), None);
    }

    #[test]
    fn wrong_version_is_absent() {
        assert_eq!(restore_location(Some("v2/gps/1000/50.85/4.35/5.0/100.0/0.0")), None);
    }

    #[test]
    fn unparsable_numbers_are_absent() {
        assert_eq!(restore_location(Some("v1/gps/soon/50.85/4.35/5.0/100.0/0.0")), None);
        assert_eq!(restore_location(Some("v1/gps/1000/north/4.35/5.0/100.0/0.0")), None);
    }

    #[test]
    fn non_finite_coordinates_are_absent() {
        assert_eq!(restore_location(Some("v1/gps/1000/NaN/inf/5.0/100.0/0.0")), None);
        assert_eq!(restore_location(Some("v1/gps/1000/50.85/-inf/5.0/100.0/0.0")), None);
        assert_eq!(restore_location(Some("v1/gps/1000/91.0/4.35/5.0/100.0/0.0")), None);
        assert_eq!(restore_location(Some("v1/gps/1000/50.85/180.5/5.0/100.0/0.0")), None);

        let err = decode_location("v1/gps/1000/NaN/4.35/5.0/100.0/0.0").unwrap_err();
        assert!(matches!(err, LocationError::Record { .. }));
    }

    #[test]
    fn empty_or_missing_is_absent() {
        assert_eq!(restore_location(None), None);
        assert_eq!(restore_location(Some("")), None);
        assert_eq!(encode_optional(None), "");
    }

    #[test]
    fn slash_in_provider_keeps_record_decodable() {
        let location = LocationSnapshot::new("fused/high", Timestamp::from_millis(5), 1.0, 2.0);
        let restored = decode_location(&encode_location(&location)).unwrap();
        assert_eq!(restored.provider, "fused_high");
    }

    #[test]
    fn accepts_exponent_notation_written_by_other_writers() {
        let restored = decode_location("v1/gps/1/1.0E1/2.0/3.0/4.0E2/0.0").unwrap();
        assert_eq!(restored.latitude, 10.0);
        assert_eq!(restored.altitude, 400.0);
    }

    proptest! {
        #[test]
        fn prop_round_trip_is_lossless(
            provider in "[a-z]{1,10}",
            millis in any::<i64>(),
            latitude in -90.0..=90.0f64,
            longitude in -180.0..=180.0f64,
            accuracy in 0.0..5000.0f32,
            altitude in -500.0..9000.0f64,
            speed in 0.0..350.0f32,
        ) {
            let original = LocationSnapshot::new(provider, Timestamp::from_millis(millis), latitude, longitude)
                .with_accuracy(accuracy)
                .with_altitude(altitude)
                .with_speed(speed);

            let restored = decode_location(&encode_location(&original)).unwrap();
            prop_assert_eq!(restored, original);
        }

        #[test]
        fn prop_garbage_never_panics(record in ".*") {
            let _ = restore_location(Some(&record));
        }
    }
}
