//! Reverse-geocoding collaborator

use async_trait::async_trait;

use crate::Result;
use crate::types::{AddressComponents, LocationSnapshot};

/// Turns a coordinate into structured address components.
///
/// The driver runs at most one call at a time and builds the
/// [`AddressSnapshot`](crate::types::AddressSnapshot) itself, so the address
/// always carries the timestamp of the location it was asked for. Calls may
/// take arbitrarily long; they are never cancelled.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync + 'static {
    async fn code(&self, location: &LocationSnapshot) -> Result<AddressComponents>;
}

/// Geocoder answering every location with the same components.
#[derive(Debug, Clone)]
pub struct StaticGeocoder {
    components: AddressComponents,
}

impl StaticGeocoder {
    pub fn new(components: AddressComponents) -> Self {
        Self { components }
    }
}

#[async_trait]
impl ReverseGeocoder for StaticGeocoder {
    async fn code(&self, _location: &LocationSnapshot) -> Result<AddressComponents> {
        Ok(self.components.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AddressComponent, Timestamp};

    #[tokio::test]
    async fn static_geocoder_ignores_coordinates() {
        let components = AddressComponents::new().with(AddressComponent::Country, "Belgium", "BE");
        let geocoder = StaticGeocoder::new(components.clone());

        let here = LocationSnapshot::new("gps", Timestamp::from_millis(1), 50.0, 4.0);
        let there = LocationSnapshot::new("gps", Timestamp::from_millis(2), -33.0, 151.0);

        assert_eq!(geocoder.code(&here).await.unwrap(), components);
        assert_eq!(geocoder.code(&there).await.unwrap(), components);
    }
}
