//! Structured address produced by reverse geocoding

use serde::{Deserialize, Serialize};
use std::fmt;

use super::freshness::{Fresh, Timestamp};
use super::snapshot::LocationSnapshot;

/// Hierarchical address components, from widest to narrowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressComponent {
    /// Belgium (BE), USA (US), ...
    Country,
    SubCountry,
    /// Illinois (IL), Saxony (SN)
    Admin,
    /// Brussels (BXL)
    Agglomeration,
    Locality,
    Neighborhood,
    Route,
    /// House number, e.g. "3b"
    Number,
}

impl AddressComponent {
    /// Number of components; every address carries all of them.
    pub const COUNT: usize = 8;

    /// All components in their fixed order.
    pub const ALL: [AddressComponent; Self::COUNT] = [
        AddressComponent::Country,
        AddressComponent::SubCountry,
        AddressComponent::Admin,
        AddressComponent::Agglomeration,
        AddressComponent::Locality,
        AddressComponent::Neighborhood,
        AddressComponent::Route,
        AddressComponent::Number,
    ];

    /// Fixed position of the component (0..=7).
    pub const fn index(self) -> usize {
        match self {
            AddressComponent::Country => 0,
            AddressComponent::SubCountry => 1,
            AddressComponent::Admin => 2,
            AddressComponent::Agglomeration => 3,
            AddressComponent::Locality => 4,
            AddressComponent::Neighborhood => 5,
            AddressComponent::Route => 6,
            AddressComponent::Number => 7,
        }
    }
}

/// Free-text value plus short code for one component. Empty when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPart {
    pub value: String,
    pub code: String,
}

impl AddressPart {
    pub fn new(value: impl Into<String>, code: impl Into<String>) -> Self {
        Self { value: value.into(), code: code.into() }
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty() && self.code.is_empty()
    }
}

/// The eight address components in fixed order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddressComponents {
    parts: [AddressPart; AddressComponent::COUNT],
}

impl AddressComponents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(
        mut self,
        component: AddressComponent,
        value: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        self.set(component, value, code);
        self
    }

    pub fn set(
        &mut self,
        component: AddressComponent,
        value: impl Into<String>,
        code: impl Into<String>,
    ) {
        self.parts[component.index()] = AddressPart::new(value, code);
    }

    pub fn get(&self, component: AddressComponent) -> &AddressPart {
        &self.parts[component.index()]
    }

    pub fn value(&self, component: AddressComponent) -> &str {
        &self.parts[component.index()].value
    }

    pub fn code(&self, component: AddressComponent) -> &str {
        &self.parts[component.index()].code
    }

    /// Components paired with their parts, in fixed order.
    pub fn iter(&self) -> impl Iterator<Item = (AddressComponent, &AddressPart)> {
        AddressComponent::ALL.into_iter().zip(self.parts.iter())
    }
}

// Codes do not take part in equality.
impl PartialEq for AddressComponents {
    fn eq(&self, other: &Self) -> bool {
        self.parts.iter().zip(other.parts.iter()).all(|(a, b)| a.value == b.value)
    }
}

/// Reverse-geocoded address tied to the location it was derived from.
///
/// Its timestamp is the source location's timestamp, not the time the
/// geocoder answered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressSnapshot {
    location: LocationSnapshot,
    components: AddressComponents,
}

impl AddressSnapshot {
    /// Build an address for `location`.
    pub fn from_location(location: LocationSnapshot, components: AddressComponents) -> Self {
        Self { location, components }
    }

    pub fn location(&self) -> &LocationSnapshot {
        &self.location
    }

    pub fn components(&self) -> &AddressComponents {
        &self.components
    }

    pub fn get(&self, component: AddressComponent) -> &AddressPart {
        self.components.get(component)
    }

    /// Codes of the first `depth` non-empty components joined with `/`
    /// (e.g. `"BE/BXL"`).
    pub fn flag(&self, depth: usize) -> String {
        self.components
            .iter()
            .map(|(_, part)| part.code.as_str())
            .filter(|code| !code.is_empty())
            .take(depth)
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl Fresh for AddressSnapshot {
    fn timestamp(&self) -> Timestamp {
        self.location.timestamp
    }
}

impl PartialEq for AddressSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components
    }
}

impl fmt::Display for AddressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (_, part) in self.components.iter().filter(|(_, p)| !p.value.is_empty()) {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{} ({})", part.value, part.code)?;
            first = false;
        }
        Ok(())
    }
}
