//! Driver task owning the location pipeline
//!
//! One tokio task owns the supervisor, the enrichment coordinator and the
//! subscriber registry, so every transition is serialized without locks.
//! Handles talk to it through a command channel and read published values
//! from `watch` channels.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::backend::BackendEvent;
use crate::config::{LocatorConfig, StalenessBasis};
use crate::enrichment::{AddressRequest, EnrichmentCoordinator};
use crate::geocoder::ReverseGeocoder;
use crate::record;
use crate::registry::{ErrorEvent, LocationSubscriber, SubscriberId, SubscriptionRegistry};
use crate::source::{SourceFactory, SourceNotification};
use crate::store::{LastKnownStore, StoreKey};
use crate::supervisor::{ProviderStatus, ProviderSupervisor, SupervisorEvent};
use crate::types::{AddressComponents, AddressSnapshot, LocationSnapshot, SourceRole, Timestamp};
use crate::{LocationError, Result};

/// Request sent from a handle to the driver.
pub enum Command {
    RequireUpdate,
    RequireAddressUpdate,
    Subscribe { subscriber: Arc<dyn LocationSubscriber>, reply: oneshot::Sender<SubscriberId> },
    Unsubscribe { id: SubscriberId, reply: oneshot::Sender<bool> },
    /// Held location unless `force`, otherwise the next accepted one
    NextLocation { force: bool, reply: oneshot::Sender<Result<LocationSnapshot>> },
    SetVirtualLocation(Option<LocationSnapshot>),
}

/// Everything the driver needs to start.
pub struct DriverSetup {
    pub config: LocatorConfig,
    pub primary: Box<dyn SourceFactory>,
    pub fallback: Option<Box<dyn SourceFactory>>,
    pub geocoder: Option<Arc<dyn ReverseGeocoder>>,
    pub store: Option<Arc<dyn LastKnownStore>>,
}

/// Result of spawning the driver
pub struct DriverChannels {
    /// Commands to the driver
    pub commands: mpsc::UnboundedSender<Command>,
    /// Held location
    pub locations: watch::Receiver<Option<Arc<LocationSnapshot>>>,
    /// Held address
    pub addresses: watch::Receiver<Option<Arc<AddressSnapshot>>>,
    /// User-chosen location
    pub virtual_location: watch::Receiver<Option<Arc<LocationSnapshot>>>,
    /// Active source status
    pub status: watch::Receiver<ProviderStatus>,
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
}

struct EnrichmentDone {
    location: LocationSnapshot,
    result: Result<AddressComponents>,
}

struct Receivers {
    notifications: mpsc::UnboundedReceiver<SourceNotification>,
    backend: mpsc::UnboundedReceiver<(SourceRole, BackendEvent)>,
    commands: mpsc::UnboundedReceiver<Command>,
    enrichment: mpsc::UnboundedReceiver<EnrichmentDone>,
}

pub struct Driver;

impl Driver {
    /// Build the primary source, restore persisted values and spawn the task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(setup: DriverSetup) -> Result<DriverChannels> {
        setup.config.validate()?;

        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let (backend_tx, backend_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (enrich_tx, enrich_rx) = mpsc::unbounded_channel();

        let DriverSetup { config, mut primary, fallback, geocoder, store } = setup;
        let mut supervisor =
            ProviderSupervisor::new(primary.as_mut(), fallback, notify_tx, backend_tx)?;

        let restored = store
            .as_ref()
            .and_then(|s| record::restore_location(s.load(StoreKey::LastLocation).as_deref()));
        if let Some(location) = restored {
            debug!(timestamp = %location.timestamp, "Restored last known location");
            supervisor.offer(location);
        }
        let virtual_location = store
            .as_ref()
            .and_then(|s| record::restore_location(s.load(StoreKey::VirtualLocation).as_deref()));

        let (location_tx, location_rx) = watch::channel(supervisor.location().cloned().map(Arc::new));
        let (address_tx, address_rx) = watch::channel(None);
        let (virtual_tx, virtual_rx) = watch::channel(virtual_location.map(Arc::new));
        let (status_tx, status_rx) = watch::channel(supervisor.status());

        let cancel = CancellationToken::new();

        let state = DriverState {
            enrichment: EnrichmentCoordinator::new(config.max_staleness()),
            registry: SubscriptionRegistry::new(),
            config,
            supervisor,
            geocoder,
            store,
            waiters: Vec::new(),
            location_tx,
            address_tx,
            virtual_tx,
            status_tx,
            enrich_tx,
        };
        let receivers = Receivers {
            notifications: notify_rx,
            backend: backend_rx,
            commands: command_rx,
            enrichment: enrich_rx,
        };

        let cancel_task = cancel.clone();
        tokio::spawn(async move {
            state.run(receivers, cancel_task).await;
        });

        Ok(DriverChannels {
            commands: command_tx,
            locations: location_rx,
            addresses: address_rx,
            virtual_location: virtual_rx,
            status: status_rx,
            cancel,
        })
    }
}

struct DriverState {
    config: LocatorConfig,
    supervisor: ProviderSupervisor,
    enrichment: EnrichmentCoordinator,
    registry: SubscriptionRegistry,
    geocoder: Option<Arc<dyn ReverseGeocoder>>,
    store: Option<Arc<dyn LastKnownStore>>,
    waiters: Vec<oneshot::Sender<Result<LocationSnapshot>>>,
    location_tx: watch::Sender<Option<Arc<LocationSnapshot>>>,
    address_tx: watch::Sender<Option<Arc<AddressSnapshot>>>,
    virtual_tx: watch::Sender<Option<Arc<LocationSnapshot>>>,
    status_tx: watch::Sender<ProviderStatus>,
    enrich_tx: mpsc::UnboundedSender<EnrichmentDone>,
}

impl DriverState {
    async fn run(mut self, mut rx: Receivers, cancel: CancellationToken) {
        info!("Location driver started");

        // Notifications emitted while the primary was being built
        self.drain_notifications(&mut rx.notifications);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Location driver cancelled");
                    break;
                }
                Some((role, event)) = rx.backend.recv() => {
                    self.supervisor.route_backend_event(role, event);
                }
                Some(done) = rx.enrichment.recv() => {
                    self.on_enrichment_complete(done);
                }
                command = rx.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        info!("All handles dropped, stopping location driver");
                        break;
                    }
                },
            }

            self.drain_notifications(&mut rx.notifications);
        }

        self.supervisor.shutdown();
        info!(subscribers = self.registry.len(), "Location driver stopped");
    }

    fn drain_notifications(&mut self, rx: &mut mpsc::UnboundedReceiver<SourceNotification>) {
        // Handling a notification may queue more (e.g. the fallback starting)
        while let Ok(notification) = rx.try_recv() {
            match self.supervisor.handle_notification(notification) {
                Some(SupervisorEvent::LocationAccepted(location)) => self.on_location_accepted(location),
                Some(SupervisorEvent::SwappedToFallback) => {
                    info!("Now tracking with the fallback source");
                }
                Some(SupervisorEvent::Exhausted(reason)) => self.on_exhausted(reason),
                None => {}
            }
        }

        let status = self.supervisor.status();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    fn on_location_accepted(&mut self, location: LocationSnapshot) {
        if self.config.persist_last_location
            && let Some(store) = &self.store
        {
            store.save(StoreKey::LastLocation, &record::encode_location(&location));
        }

        self.location_tx.send_replace(Some(Arc::new(location.clone())));
        self.registry.notify_location(&location);

        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Ok(location.clone()));
        }

        if self.geocoder.is_some() {
            let now = match self.config.staleness_basis {
                StalenessBasis::EventTime => location.timestamp,
                StalenessBasis::WallClock => Timestamp::now(),
            };
            if let Some(target) = self.enrichment.on_location(&location, now) {
                self.start_enrichment(target);
            }
        }
    }

    fn on_exhausted(&mut self, reason: String) {
        let event = ErrorEvent::providers_exhausted(reason.clone());
        self.registry.notify_error(&event);

        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(LocationError::providers_exhausted(reason.clone())));
        }
    }

    fn start_enrichment(&self, target: LocationSnapshot) {
        let Some(geocoder) = self.geocoder.clone() else {
            return;
        };
        debug!(timestamp = %target.timestamp, "Starting reverse geocoding");

        // Short-lived task; the driver keeps processing fixes meanwhile
        let enrich_tx = self.enrich_tx.clone();
        tokio::spawn(async move {
            let result = geocoder.code(&target).await;
            if enrich_tx.send(EnrichmentDone { location: target, result }).is_err() {
                trace!("Geocoding finished after driver shutdown");
            }
        });
    }

    fn on_enrichment_complete(&mut self, done: EnrichmentDone) {
        let current = self.supervisor.location().cloned();

        let follow_up = match done.result {
            Ok(components) => {
                let address = AddressSnapshot::from_location(done.location, components);
                let outcome = self.enrichment.complete_success(address, current.as_ref());
                if let Some(address) = outcome.accepted {
                    self.address_tx.send_replace(Some(Arc::new(address.clone())));
                    self.registry.notify_address(&address);
                }
                outcome.follow_up
            }
            Err(e) => {
                warn!(timestamp = %done.location.timestamp, "Reverse geocoding failed: {}", e);
                let follow_up = self.enrichment.complete_failure(current.as_ref());
                self.registry.notify_error(&ErrorEvent::enrichment(e.to_string()));
                follow_up
            }
        };

        if let Some(target) = follow_up {
            self.start_enrichment(target);
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::RequireUpdate => self.supervisor.require_update(),
            Command::RequireAddressUpdate => {
                if self.geocoder.is_none() {
                    warn!("Address update requested without a geocoder");
                    return;
                }
                match self.enrichment.require_address_update(self.supervisor.location()) {
                    AddressRequest::Enrich(target) => self.start_enrichment(target),
                    AddressRequest::NeedLocation => self.supervisor.require_update(),
                    AddressRequest::Deferred => {}
                }
            }
            Command::Subscribe { subscriber, reply } => {
                let _ = reply.send(self.registry.subscribe(subscriber));
            }
            Command::Unsubscribe { id, reply } => {
                let _ = reply.send(self.registry.unsubscribe(id));
            }
            Command::NextLocation { force, reply } => {
                if !force && let Some(location) = self.supervisor.location() {
                    let _ = reply.send(Ok(location.clone()));
                    return;
                }
                if self.supervisor.is_exhausted() {
                    let _ = reply.send(Err(LocationError::providers_exhausted(
                        "no position source is available",
                    )));
                    return;
                }
                self.waiters.push(reply);
                self.supervisor.require_update();
            }
            Command::SetVirtualLocation(location) => {
                if let Some(store) = &self.store {
                    store.save(StoreKey::VirtualLocation, &record::encode_optional(location.as_ref()));
                }
                debug!(set = location.is_some(), "Virtual location updated");
                self.virtual_tx.send_replace(location.map(Arc::new));
            }
        }
    }
}
