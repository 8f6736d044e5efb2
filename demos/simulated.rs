//! Simulated location pipeline
//!
//! A passive primary backend delivers two fixes and then fails; the
//! pipeline swaps to a GPS-like fallback and keeps tracking. Every accepted
//! location is reverse-geocoded by a static geocoder.
//!
//! Run with `RUST_LOG=locus=debug cargo run --example simulated`.

use anyhow::Result;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;
use tracing_subscriber::EnvFilter;

use locus::backend::{BackendCallback, BackendFailure, PositionBackend, RawFix};
use locus::sources::from_backend;
use locus::types::{AddressComponent, AddressComponents, ConnectionState, LocationSnapshot};
use locus::{
    AddressSnapshot, ErrorEvent, Locus, LocationSubscriber, MemoryStore, StaticGeocoder, Timestamp,
};

/// Walks north from a start point, one fix per tick.
struct WalkingBackend {
    name: &'static str,
    start: (f64, f64),
    fixes_before_failure: Option<usize>,
    tick: Duration,
    task: Option<JoinHandle<()>>,
    callback: Option<BackendCallback>,
}

impl WalkingBackend {
    fn new(name: &'static str, start: (f64, f64), fixes_before_failure: Option<usize>) -> Self {
        Self {
            name,
            start,
            fixes_before_failure,
            tick: Duration::from_millis(400),
            task: None,
            callback: None,
        }
    }
}

impl PositionBackend for WalkingBackend {
    fn name(&self) -> &str {
        self.name
    }

    fn start(&mut self, callback: BackendCallback) -> ConnectionState {
        self.callback = Some(callback);
        ConnectionState::Connected
    }

    fn request_continuous_low_power_updates(&mut self) -> Result<(), BackendFailure> {
        if self.task.is_some() {
            return Ok(());
        }
        let callback = self.callback.clone().ok_or(BackendFailure::NotConnected)?;
        let (name, (lat, lon), limit, tick) =
            (self.name, self.start, self.fixes_before_failure, self.tick);

        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            for step in 0usize.. {
                interval.tick().await;
                if limit.is_some_and(|limit| step >= limit) {
                    callback.failure(format!("{} stopped responding", name));
                    return;
                }
                let fix = RawFix::new(name, Timestamp::now(), lat + step as f64 * 0.0005, lon)
                    .with_accuracy(if name == "gps" { 5.0 } else { 40.0 });
                if !callback.fix(fix) {
                    return;
                }
            }
        }));
        Ok(())
    }

    fn request_one_update(&mut self) -> Result<(), BackendFailure> {
        self.request_continuous_low_power_updates()
    }

    fn stop(&mut self) -> Result<(), BackendFailure> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        Ok(())
    }
}

struct Printer;

impl LocationSubscriber for Printer {
    fn on_location_changed(&self, location: &LocationSnapshot) {
        info!(provider = %location.provider, "location {}", location.to_url_query());
    }

    fn on_address_changed(&self, address: &AddressSnapshot) {
        info!(flag = %address.flag(2), "address {}", address);
    }

    fn on_provider_error(&self, error: &ErrorEvent) {
        info!("error: {}", error);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let brussels = (50.8467, 4.3525);
    let geocoder = StaticGeocoder::new(
        AddressComponents::new()
            .with(AddressComponent::Country, "Belgium", "BE")
            .with(AddressComponent::Agglomeration, "Bruxelles", "BXL")
            .with(AddressComponent::Locality, "Bruxelles", ""),
    );

    let handle = Locus::builder(from_backend(move || Ok(WalkingBackend::new("passive", brussels, Some(2)))))
        .fallback(from_backend(move || Ok(WalkingBackend::new("gps", brussels, None))))
        .geocoder(Arc::new(geocoder))
        .store(Arc::new(MemoryStore::new()))
        .spawn()?;

    handle.subscribe(Arc::new(Printer)).await?;

    let first = handle.current_or_next(false).await?;
    info!("first fix at {}", first.to_url_query());

    let mut updates = Box::pin(handle.location_updates().take(6));
    let mut previous: Option<Arc<LocationSnapshot>> = None;
    while let Some(location) = updates.next().await {
        if let Some(previous) = &previous {
            info!("moved {:.1} m", previous.distance_to(&location));
        }
        previous = Some(location);
    }

    let status = handle.provider_status();
    info!(role = %status.role, state = %status.state, "tracking summary");

    handle.shutdown();
    Ok(())
}
