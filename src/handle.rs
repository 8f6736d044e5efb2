//! Public handle to a running location pipeline

use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::driver::{Command, DriverChannels};
use crate::registry::{LocationSubscriber, SubscriberId};
use crate::stream::ThrottleExt;
use crate::supervisor::ProviderStatus;
use crate::types::{AddressSnapshot, DeliveryRate, LocationSnapshot};
use crate::{LocationError, Result};

/// Handle to the location driver.
///
/// Reads are served from the values last published by the driver and never
/// block. Requests are queued to the driver and return immediately. Dropping
/// the handle stops the driver and its sources.
pub struct LocationHandle {
    commands: mpsc::UnboundedSender<Command>,
    locations: watch::Receiver<Option<Arc<LocationSnapshot>>>,
    addresses: watch::Receiver<Option<Arc<AddressSnapshot>>>,
    virtual_location: watch::Receiver<Option<Arc<LocationSnapshot>>>,
    status: watch::Receiver<ProviderStatus>,

    /// Rate used by `location_updates`
    delivery_rate: DeliveryRate,

    enrichment_enabled: bool,
    cancel: CancellationToken,
}

impl LocationHandle {
    pub(crate) fn new(
        channels: DriverChannels,
        delivery_rate: DeliveryRate,
        enrichment_enabled: bool,
    ) -> Self {
        Self {
            commands: channels.commands,
            locations: channels.locations,
            addresses: channels.addresses,
            virtual_location: channels.virtual_location,
            status: channels.status,
            delivery_rate,
            enrichment_enabled,
            cancel: channels.cancel,
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| LocationError::DriverStopped)
    }

    /// Ask the active source for one active fix.
    pub fn require_update(&self) -> Result<()> {
        self.send(Command::RequireUpdate)
    }

    /// Ask for a fresh address for the current location.
    ///
    /// Without a held location, a fix is requested first and the address is
    /// resolved once it arrives.
    pub fn require_address_update(&self) -> Result<()> {
        if !self.enrichment_enabled {
            return Err(LocationError::precondition(
                "require_address_update needs a reverse geocoder",
            ));
        }
        self.send(Command::RequireAddressUpdate)
    }

    /// Best location held, after the freshness rule
    pub fn location(&self) -> Option<Arc<LocationSnapshot>> {
        self.locations.borrow().clone()
    }

    /// Latest address, if enrichment has succeeded at least once
    pub fn address(&self) -> Option<Arc<AddressSnapshot>> {
        self.addresses.borrow().clone()
    }

    pub fn provider_status(&self) -> ProviderStatus {
        *self.status.borrow()
    }

    pub fn virtual_location(&self) -> Option<Arc<LocationSnapshot>> {
        self.virtual_location.borrow().clone()
    }

    /// Set or clear the user-chosen location. It is persisted separately
    /// from the tracked one and never competes with it.
    pub fn set_virtual_location(&self, location: Option<LocationSnapshot>) -> Result<()> {
        self.send(Command::SetVirtualLocation(location))
    }

    /// Register a subscriber. Registering the same `Arc` twice returns the
    /// same id.
    pub async fn subscribe(&self, subscriber: Arc<dyn LocationSubscriber>) -> Result<SubscriberId> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Subscribe { subscriber, reply })?;
        rx.await.map_err(|_| LocationError::DriverStopped)
    }

    /// Remove a subscriber. Returns false if it was not registered.
    pub async fn unsubscribe(&self, id: SubscriberId) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Unsubscribe { id, reply })?;
        rx.await.map_err(|_| LocationError::DriverStopped)
    }

    /// Held location, or the next accepted one when none is held or `force`
    /// is set. Requests an active fix when it has to wait.
    pub async fn current_or_next(&self, force: bool) -> Result<LocationSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::NextLocation { force, reply })?;
        rx.await.map_err(|_| LocationError::DriverStopped)?
    }

    /// Accepted locations at the configured delivery rate.
    pub fn location_updates(&self) -> impl Stream<Item = Arc<LocationSnapshot>> + 'static {
        self.location_updates_at(self.delivery_rate)
    }

    /// Accepted locations at `rate`.
    ///
    /// The held location, if any, is yielded first. Intermediate values may
    /// be skipped when the consumer is slower than the driver.
    pub fn location_updates_at(
        &self,
        rate: DeliveryRate,
    ) -> impl Stream<Item = Arc<LocationSnapshot>> + 'static {
        let locations = WatchStream::new(self.locations.clone()).filter_map(|opt| async move { opt });

        match rate.throttle_interval() {
            None => locations.boxed(),
            Some(interval) => locations.throttle(interval).boxed(),
        }
    }

    /// Accepted addresses.
    pub fn address_updates(&self) -> impl Stream<Item = Arc<AddressSnapshot>> + 'static {
        WatchStream::new(self.addresses.clone()).filter_map(|opt| async move { opt })
    }

    /// Active source status changes, starting with the current one.
    pub fn status_updates(&self) -> impl Stream<Item = ProviderStatus> + 'static {
        WatchStream::new(self.status.clone())
    }

    /// Whether the driver task is still running
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Stop the driver and its sources.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for LocationHandle {
    fn drop(&mut self) {
        debug!("Dropping location handle");
        self.cancel.cancel();
    }
}
