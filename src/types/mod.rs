//! Core value types for location tracking.
//!
//! - [`LocationSnapshot`] is an immutable position fix from one source
//! - [`AddressSnapshot`] is a reverse-geocoded address bound to the fix it came from
//! - [`Timestamp`] and [`Fresh`] carry the single ordering key used to merge values
//! - [`ProviderState`], [`ConnectionState`] and [`SourceRole`] describe sources
//! - [`DeliveryRate`] controls how often location streams yield
//!
//! ## Usage Example
//!
//! ```rust
//! use locus::types::{LocationSnapshot, Timestamp, supersedes};
//!
//! let held = LocationSnapshot::new("gps", Timestamp::from_millis(100), 10.0, 10.0);
//! let late = LocationSnapshot::new("network", Timestamp::from_millis(90), 20.0, 20.0);
//!
//! // Older fixes never replace newer ones, whatever their source.
//! assert!(!supersedes(Some(&held), &late));
//! ```

mod address;
mod freshness;
mod snapshot;
mod state;
mod update_rate;

pub use address::{AddressComponent, AddressComponents, AddressPart, AddressSnapshot};
pub use freshness::{Fresh, Timestamp, supersedes};
pub use snapshot::{FlagEntry, LocationSnapshot, distance_degrees};
pub use state::{ConnectionState, ProviderState, SourceRole};
pub use update_rate::DeliveryRate;
