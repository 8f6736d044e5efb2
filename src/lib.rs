//! Provider-fallback location tracking.
//!
//! Locus turns several unreliable position sources into one best-effort,
//! monotonically improving current location, optionally enriched with a
//! reverse-geocoded address.
//!
//! # Features
//!
//! - **Fallback swap**: a passive primary source is replaced by a fallback
//!   source the first time it fails, without losing subscribers
//! - **Freshness merging**: a location only replaces the held one when its
//!   timestamp is strictly newer, whatever source it came from
//! - **Debounced enrichment**: at most one reverse-geocoding call in flight,
//!   re-run on explicit request or when the address goes stale
//! - **Persistence**: last known and virtual locations survive restarts
//!   through a pluggable store
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use locus::{Locus, sources::from_backend};
//! # use locus::backend::{BackendCallback, BackendFailure, PositionBackend};
//! # use locus::types::ConnectionState;
//! # struct Passive;
//! # impl PositionBackend for Passive {
//! #     fn name(&self) -> &str { "passive" }
//! #     fn start(&mut self, _: BackendCallback) -> ConnectionState { ConnectionState::Connected }
//! #     fn request_continuous_low_power_updates(&mut self) -> Result<(), BackendFailure> { Ok(()) }
//! #     fn request_one_update(&mut self) -> Result<(), BackendFailure> { Ok(()) }
//! #     fn stop(&mut self) -> Result<(), BackendFailure> { Ok(()) }
//! # }
//! # struct Gps;
//! # impl PositionBackend for Gps {
//! #     fn name(&self) -> &str { "gps" }
//! #     fn start(&mut self, _: BackendCallback) -> ConnectionState { ConnectionState::Connected }
//! #     fn request_continuous_low_power_updates(&mut self) -> Result<(), BackendFailure> { Ok(()) }
//! #     fn request_one_update(&mut self) -> Result<(), BackendFailure> { Ok(()) }
//! #     fn stop(&mut self) -> Result<(), BackendFailure> { Ok(()) }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> locus::Result<()> {
//!     let handle = Locus::builder(from_backend(|| Ok(Passive)))
//!         .fallback(from_backend(|| Ok(Gps)))
//!         .spawn()?;
//!
//!     let here = handle.current_or_next(false).await?;
//!     println!("{}", here.to_url_query());
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Collaborator boundaries
pub mod backend;
pub mod geocoder;
pub mod record;
pub mod store;

// Coordination layer
pub mod config;
pub mod driver;
pub mod enrichment;
pub mod handle;
pub mod registry;
pub mod source;
pub mod sources;
pub mod stream;
pub mod supervisor;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use config::{LocatorConfig, StalenessBasis};
pub use geocoder::{ReverseGeocoder, StaticGeocoder};
pub use handle::LocationHandle;
pub use registry::{ErrorEvent, ErrorKind, LocationSubscriber, SubscriberId};
pub use store::{LastKnownStore, MemoryStore, StoreKey};
pub use supervisor::ProviderStatus;

use std::sync::Arc;

use driver::{Driver, DriverSetup};
use source::SourceFactory;

/// Entry point for building a location pipeline.
///
/// ```rust,no_run
/// use locus::{Locus, LocatorConfig, MemoryStore};
/// use std::sync::Arc;
/// # use locus::sources::from_backend;
/// # use locus::backend::{BackendCallback, BackendFailure, PositionBackend};
/// # use locus::types::ConnectionState;
/// # struct Passive;
/// # impl PositionBackend for Passive {
/// #     fn name(&self) -> &str { "passive" }
/// #     fn start(&mut self, _: BackendCallback) -> ConnectionState { ConnectionState::Connected }
/// #     fn request_continuous_low_power_updates(&mut self) -> Result<(), BackendFailure> { Ok(()) }
/// #     fn request_one_update(&mut self) -> Result<(), BackendFailure> { Ok(()) }
/// #     fn stop(&mut self) -> Result<(), BackendFailure> { Ok(()) }
/// # }
///
/// # #[tokio::main]
/// # async fn main() -> locus::Result<()> {
/// let config = LocatorConfig::from_yaml_str("max_staleness_ms: 300000\n")?;
/// let handle = Locus::builder(from_backend(|| Ok(Passive)))
///     .store(Arc::new(MemoryStore::new()))
///     .config(config)
///     .spawn()?;
/// # Ok(())
/// # }
/// ```
pub struct Locus;

impl Locus {
    /// Start building a pipeline around the primary (passive) source.
    pub fn builder(primary: impl SourceFactory + 'static) -> LocusBuilder {
        LocusBuilder {
            primary: Box::new(primary),
            fallback: None,
            geocoder: None,
            store: None,
            config: LocatorConfig::default(),
        }
    }
}

/// Builder returned by [`Locus::builder`].
pub struct LocusBuilder {
    primary: Box<dyn SourceFactory>,
    fallback: Option<Box<dyn SourceFactory>>,
    geocoder: Option<Arc<dyn ReverseGeocoder>>,
    store: Option<Arc<dyn LastKnownStore>>,
    config: LocatorConfig,
}

impl LocusBuilder {
    /// Source built the first time the primary fails.
    pub fn fallback(mut self, fallback: impl SourceFactory + 'static) -> Self {
        self.fallback = Some(Box::new(fallback));
        self
    }

    /// Enable address enrichment.
    pub fn geocoder(mut self, geocoder: Arc<dyn ReverseGeocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    /// Persist the last known and virtual locations.
    pub fn store(mut self, store: Arc<dyn LastKnownStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(mut self, config: LocatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the primary source and spawn the driver.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> Result<LocationHandle> {
        let delivery_rate = self.config.delivery_rate.normalize();
        let enrichment_enabled = self.geocoder.is_some();

        let channels = Driver::spawn(DriverSetup {
            config: self.config,
            primary: self.primary,
            fallback: self.fallback,
            geocoder: self.geocoder,
            store: self.store,
        })?;

        tracing::info!(enrichment_enabled, "Location pipeline spawned");
        Ok(LocationHandle::new(channels, delivery_rate, enrichment_enabled))
    }
}
