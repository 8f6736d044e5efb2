//! Position source contract
//!
//! A [`PositionSource`] wraps one backend and reports to exactly one
//! [`SourceListener`]. The supervisor installs a [`ChannelListener`] so that
//! notifications are funnelled into the driver task, which serializes them.

use tokio::sync::mpsc;
use tracing::trace;

use crate::Result;
use crate::backend::{BackendCallback, BackendEvent};
use crate::types::{LocationSnapshot, ProviderState, SourceRole};

/// Receiver of a source's notifications.
pub trait SourceListener: Send {
    fn on_location_changed(&self, location: &LocationSnapshot, source: SourceRole);

    fn on_provider_state_change(&self, state: ProviderState, source: SourceRole);
}

/// Notification emitted by a source, as seen by the supervisor.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceNotification {
    LocationChanged { role: SourceRole, location: LocationSnapshot },
    StateChanged { role: SourceRole, state: ProviderState },
}

impl SourceNotification {
    pub fn role(&self) -> SourceRole {
        match self {
            SourceNotification::LocationChanged { role, .. } => *role,
            SourceNotification::StateChanged { role, .. } => *role,
        }
    }
}

/// Listener forwarding notifications into a channel.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<SourceNotification>,
}

impl ChannelListener {
    pub fn new(tx: mpsc::UnboundedSender<SourceNotification>) -> Self {
        Self { tx }
    }
}

impl SourceListener for ChannelListener {
    fn on_location_changed(&self, location: &LocationSnapshot, source: SourceRole) {
        let notification =
            SourceNotification::LocationChanged { role: source, location: location.clone() };
        if self.tx.send(notification).is_err() {
            trace!(role = ?source, "Location notification dropped, supervisor gone");
        }
    }

    fn on_provider_state_change(&self, state: ProviderState, source: SourceRole) {
        if self.tx.send(SourceNotification::StateChanged { role: source, state }).is_err() {
            trace!(role = ?source, "State notification dropped, supervisor gone");
        }
    }
}

/// One positioning source.
///
/// Contract:
/// - `start` is idempotent and a no-op while started or down
/// - `stop` reaches `Stopped` from any state except `Down` and releases the
///   backend subscription; no location is forwarded while stopped
/// - `require_update` asks for one active fix and is a no-op while one is
///   outstanding; the passive subscription is re-armed once it is delivered
/// - every complete backend fix is forwarded once, in backend order
/// - state changes are notified only when the state actually changes
pub trait PositionSource: Send {
    /// Slot this source occupies
    fn role(&self) -> SourceRole;

    fn start(&mut self);

    fn stop(&mut self);

    fn require_update(&mut self);

    /// Most recent fix accepted from the backend
    fn location(&self) -> Option<&LocationSnapshot>;

    fn state(&self) -> ProviderState;

    /// Replace the listener; `None` silences the source.
    fn set_listener(&mut self, listener: Option<Box<dyn SourceListener>>);

    /// Feed an asynchronous backend signal
    fn handle_backend_event(&mut self, event: BackendEvent);
}

/// Builds the source for a supervisor slot.
pub trait SourceFactory: Send {
    fn create(
        &mut self,
        role: SourceRole,
        listener: Box<dyn SourceListener>,
        callback: BackendCallback,
    ) -> Result<Box<dyn PositionSource>>;
}
