//! Provider supervision and fallback swap
//!
//! The supervisor owns exactly one active [`PositionSource`]. When the primary
//! reports `Error` (or `Down`) it is detached and stopped, and the fallback is
//! built in its place. The swap happens at most once; a failing fallback
//! exhausts the supervisor.
//!
//! Location notifications from either source go through the same freshness
//! rule, so a late fix from a slower source never replaces a newer one.

use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::Result;
use crate::backend::{BackendCallback, BackendEvent};
use crate::source::{ChannelListener, PositionSource, SourceFactory, SourceNotification};
use crate::types::{LocationSnapshot, ProviderState, SourceRole, supersedes};

/// Observable outcome of a source notification.
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorEvent {
    /// A location passed the freshness rule and is now held
    LocationAccepted(LocationSnapshot),

    /// The fallback source replaced the failed primary
    SwappedToFallback,

    /// No source is left; carries the reason
    Exhausted(String),
}

/// Snapshot of the active source, published to handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderStatus {
    pub role: SourceRole,
    pub state: ProviderState,
    pub exhausted: bool,
}

pub struct ProviderSupervisor {
    active: Box<dyn PositionSource>,
    fallback: Option<Box<dyn SourceFactory>>,
    held: Option<LocationSnapshot>,
    notify_tx: mpsc::UnboundedSender<SourceNotification>,
    backend_tx: mpsc::UnboundedSender<(SourceRole, BackendEvent)>,

    /// An active fix was requested and no location has been accepted since
    update_requested: bool,

    exhausted: bool,
}

impl ProviderSupervisor {
    /// Build the primary source and wire it to the given channels.
    pub fn new(
        primary: &mut dyn SourceFactory,
        fallback: Option<Box<dyn SourceFactory>>,
        notify_tx: mpsc::UnboundedSender<SourceNotification>,
        backend_tx: mpsc::UnboundedSender<(SourceRole, BackendEvent)>,
    ) -> Result<Self> {
        let active = primary.create(
            SourceRole::Primary,
            Box::new(ChannelListener::new(notify_tx.clone())),
            BackendCallback::new(SourceRole::Primary, backend_tx.clone()),
        )?;

        info!(state = %active.state(), has_fallback = fallback.is_some(), "Provider supervisor started");

        Ok(Self {
            active,
            fallback,
            held: None,
            notify_tx,
            backend_tx,
            update_requested: false,
            exhausted: false,
        })
    }

    /// Forward a backend event to the source it belongs to.
    ///
    /// Events for a source that is no longer active are dropped.
    pub fn route_backend_event(&mut self, role: SourceRole, event: BackendEvent) {
        if role != self.active.role() {
            trace!(role = ?role, "Dropping backend event for detached source");
            return;
        }
        self.active.handle_backend_event(event);
    }

    /// Apply one source notification.
    pub fn handle_notification(&mut self, notification: SourceNotification) -> Option<SupervisorEvent> {
        if notification.role() != self.active.role() || self.exhausted {
            trace!(role = ?notification.role(), "Ignoring notification from inactive source");
            return None;
        }

        match notification {
            SourceNotification::LocationChanged { location, .. } => {
                self.offer(location.clone()).then_some(SupervisorEvent::LocationAccepted(location))
            }
            SourceNotification::StateChanged { role, state } => {
                debug!(role = ?role, state = %state, "Active source state changed");
                if !state.is_failed() {
                    return None;
                }
                match role {
                    SourceRole::Primary => Some(self.swap_to_fallback(state)),
                    SourceRole::Fallback => {
                        Some(self.exhaust(format!("fallback source reported {}", state)))
                    }
                }
            }
        }
    }

    /// Apply the freshness rule to `location`. Returns true when it is now held.
    pub fn offer(&mut self, location: LocationSnapshot) -> bool {
        if !supersedes(self.held.as_ref(), &location) {
            debug!(
                incoming = %location.timestamp,
                held = ?self.held.as_ref().map(|l| l.timestamp.as_millis()),
                "Dropping location that is not newer than the held one"
            );
            return false;
        }

        trace!(provider = %location.provider, timestamp = %location.timestamp, "Location accepted");
        self.held = Some(location);
        self.update_requested = false;
        true
    }

    /// Ask the active source for one active fix.
    pub fn require_update(&mut self) {
        if self.exhausted {
            debug!("Update requested after every source failed, ignoring");
            return;
        }
        self.update_requested = true;
        self.active.require_update();
    }

    /// Held location, after the freshness rule
    pub fn location(&self) -> Option<&LocationSnapshot> {
        self.held.as_ref()
    }

    pub fn active_role(&self) -> SourceRole {
        self.active.role()
    }

    pub fn active_state(&self) -> ProviderState {
        self.active.state()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn status(&self) -> ProviderStatus {
        ProviderStatus {
            role: self.active.role(),
            state: self.active.state(),
            exhausted: self.exhausted,
        }
    }

    /// Detach and stop the active source.
    pub fn shutdown(&mut self) {
        self.active.set_listener(None);
        self.active.stop();
    }

    fn swap_to_fallback(&mut self, cause: ProviderState) -> SupervisorEvent {
        let Some(mut factory) = self.fallback.take() else {
            return self.exhaust(format!("primary source reported {} and no fallback is configured", cause));
        };

        warn!(cause = %cause, "Primary source failed, swapping to fallback");
        self.active.set_listener(None);
        self.active.stop();

        let created = factory.create(
            SourceRole::Fallback,
            Box::new(ChannelListener::new(self.notify_tx.clone())),
            BackendCallback::new(SourceRole::Fallback, self.backend_tx.clone()),
        );

        match created {
            Ok(source) => {
                self.active = source;
                info!(state = %self.active.state(), "Fallback source active");

                if self.update_requested {
                    debug!("Re-issuing outstanding update request on fallback");
                    self.active.require_update();
                }
                SupervisorEvent::SwappedToFallback
            }
            Err(e) => self.exhaust(format!("fallback source could not be created: {}", e)),
        }
    }

    fn exhaust(&mut self, reason: String) -> SupervisorEvent {
        error!("Location providers exhausted: {}", reason);
        self.exhausted = true;
        self.update_requested = false;
        self.shutdown();
        SupervisorEvent::Exhausted(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LocationError;
    use crate::backend::BackendFailure;
    use crate::sources::from_backend;
    use crate::test_utils::{BackendCall, ScriptedBackend, snapshot};

    struct Harness {
        supervisor: ProviderSupervisor,
        notifications: mpsc::UnboundedReceiver<SourceNotification>,
        backend_events: mpsc::UnboundedReceiver<(SourceRole, BackendEvent)>,
        events: Vec<SupervisorEvent>,
    }

    impl Harness {
        fn new(primary: &ScriptedBackend, fallback: Option<&ScriptedBackend>) -> Self {
            let (notify_tx, notifications) = mpsc::unbounded_channel();
            let (backend_tx, backend_events) = mpsc::unbounded_channel();

            let primary = primary.clone();
            let mut primary_factory = from_backend(move || Ok(primary.clone()));
            let fallback_factory = fallback.map(|backend| {
                let backend = backend.clone();
                Box::new(from_backend(move || Ok(backend.clone()))) as Box<dyn SourceFactory>
            });

            let supervisor =
                ProviderSupervisor::new(&mut primary_factory, fallback_factory, notify_tx, backend_tx)
                    .unwrap();
            let mut harness = Self { supervisor, notifications, backend_events, events: Vec::new() };
            harness.pump();
            harness
        }

        /// Deliver every queued backend event and notification, as the driver does.
        fn pump(&mut self) {
            loop {
                let mut progressed = false;
                while let Ok((role, event)) = self.backend_events.try_recv() {
                    self.supervisor.route_backend_event(role, event);
                    progressed = true;
                }
                while let Ok(notification) = self.notifications.try_recv() {
                    if let Some(event) = self.supervisor.handle_notification(notification) {
                        self.events.push(event);
                    }
                    progressed = true;
                }
                if !progressed {
                    break;
                }
            }
        }

        fn accepted(&self) -> Vec<i64> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    SupervisorEvent::LocationAccepted(l) => Some(l.timestamp.as_millis()),
                    _ => None,
                })
                .collect()
        }
    }

    #[test]
    fn starts_on_primary() {
        let primary = ScriptedBackend::new("passive");
        let h = Harness::new(&primary, None);

        assert_eq!(h.supervisor.active_role(), SourceRole::Primary);
        assert_eq!(h.supervisor.active_state(), ProviderState::Started);
        assert!(h.supervisor.location().is_none());
    }

    #[test]
    fn freshness_applies_across_sources() {
        let primary = ScriptedBackend::new("passive");
        let fallback = ScriptedBackend::new("gps");
        let mut h = Harness::new(&primary, Some(&fallback));

        primary.emit_fix(100, 10.0, 10.0);
        h.pump();
        primary.emit_failure("service died");
        h.pump();
        assert_eq!(h.supervisor.active_role(), SourceRole::Fallback);

        fallback.emit_fix(90, 20.0, 20.0);
        h.pump();
        assert_eq!(h.supervisor.location().unwrap().latitude, 10.0);

        fallback.emit_fix(200, 30.0, 30.0);
        h.pump();
        assert_eq!(h.supervisor.location().unwrap().timestamp.as_millis(), 200);
        assert_eq!(h.accepted(), vec![100, 200]);
    }

    #[test]
    fn equal_timestamp_keeps_held_value() {
        let primary = ScriptedBackend::new("passive");
        let mut h = Harness::new(&primary, None);

        primary.emit_fix(50, 1.0, 1.0);
        primary.emit_fix(50, 2.0, 2.0);
        h.pump();

        assert_eq!(h.supervisor.location().unwrap().latitude, 1.0);
        assert_eq!(h.accepted(), vec![50]);
    }

    #[test]
    fn swap_detaches_and_stops_primary() {
        let primary = ScriptedBackend::new("passive");
        let fallback = ScriptedBackend::new("gps");
        let mut h = Harness::new(&primary, Some(&fallback));

        primary.emit_failure("gone");
        h.pump();

        assert!(h.events.contains(&SupervisorEvent::SwappedToFallback));
        assert_eq!(primary.count(BackendCall::Stop), 1);
        assert!(fallback.is_started());

        // Late fixes from the detached primary are ignored
        primary.emit_fix(1_000, 5.0, 5.0);
        h.pump();
        assert!(h.supervisor.location().is_none());
    }

    #[test]
    fn primary_down_also_swaps() {
        let primary = ScriptedBackend::new("passive");
        let fallback = ScriptedBackend::new("gps");
        let mut h = Harness::new(&primary, Some(&fallback));

        primary.emit(BackendEvent::Unavailable("no play services".into()));
        h.pump();
        assert_eq!(h.supervisor.active_role(), SourceRole::Fallback);
    }

    #[test]
    fn swap_happens_once_and_fallback_failure_exhausts() {
        let primary = ScriptedBackend::new("passive");
        let fallback = ScriptedBackend::new("gps");
        let mut h = Harness::new(&primary, Some(&fallback));

        primary.emit_failure("gone");
        h.pump();
        fallback.emit_failure("gps off");
        h.pump();
        fallback.emit_failure("gps still off");
        h.pump();

        let exhausted: Vec<_> =
            h.events.iter().filter(|e| matches!(e, SupervisorEvent::Exhausted(_))).collect();
        assert_eq!(exhausted.len(), 1);
        assert!(h.supervisor.is_exhausted());
        assert_eq!(h.supervisor.active_role(), SourceRole::Fallback);
        assert!(h.supervisor.status().exhausted);
    }

    #[test]
    fn no_fallback_means_exhaustion() {
        let primary = ScriptedBackend::new("passive");
        let mut h = Harness::new(&primary, None);

        primary.emit_failure("gone");
        h.pump();
        assert!(matches!(h.events.last(), Some(SupervisorEvent::Exhausted(_))));
    }

    #[test]
    fn failing_fallback_factory_exhausts() {
        let (notify_tx, mut notifications) = mpsc::unbounded_channel();
        let (backend_tx, mut backend_events) = mpsc::unbounded_channel();
        let primary = ScriptedBackend::new("passive");
        let probe = primary.clone();
        let mut primary_factory = from_backend(move || Ok(primary.clone()));
        let fallback_factory = from_backend(|| -> crate::Result<ScriptedBackend> {
            Err(LocationError::backend_failed("gps hardware missing"))
        });

        let mut supervisor = ProviderSupervisor::new(
            &mut primary_factory,
            Some(Box::new(fallback_factory)),
            notify_tx,
            backend_tx,
        )
        .unwrap();

        probe.emit_failure("gone");
        while let Ok((role, event)) = backend_events.try_recv() {
            supervisor.route_backend_event(role, event);
        }
        let mut events = Vec::new();
        while let Ok(n) = notifications.try_recv() {
            events.extend(supervisor.handle_notification(n));
        }

        match events.last() {
            Some(SupervisorEvent::Exhausted(reason)) => assert!(reason.contains("gps hardware missing")),
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn outstanding_update_is_reissued_on_fallback() {
        let primary = ScriptedBackend::new("passive");
        let fallback = ScriptedBackend::new("gps");
        let mut h = Harness::new(&primary, Some(&fallback));

        h.supervisor.require_update();
        assert_eq!(primary.count(BackendCall::OneUpdate), 1);

        primary.emit_failure("gone");
        h.pump();
        assert_eq!(fallback.count(BackendCall::OneUpdate), 1);
    }

    #[test]
    fn satisfied_update_is_not_reissued() {
        let primary = ScriptedBackend::new("passive");
        let fallback = ScriptedBackend::new("gps");
        let mut h = Harness::new(&primary, Some(&fallback));

        h.supervisor.require_update();
        primary.emit_fix(10, 1.0, 1.0);
        h.pump();
        primary.emit_failure("gone");
        h.pump();
        assert_eq!(fallback.count(BackendCall::OneUpdate), 0);
    }

    #[test]
    fn refused_primary_request_swaps() {
        let primary = ScriptedBackend::new("passive");
        let fallback = ScriptedBackend::new("gps");
        let mut h = Harness::new(&primary, Some(&fallback));

        primary.refuse_requests(BackendFailure::PermissionDenied);
        h.supervisor.require_update();
        h.pump();
        assert_eq!(h.supervisor.active_role(), SourceRole::Fallback);
    }

    #[test]
    fn seed_obeys_freshness() {
        let primary = ScriptedBackend::new("passive");
        let mut h = Harness::new(&primary, None);

        assert!(h.supervisor.offer(snapshot("stored", 500, 1.0, 1.0)));
        primary.emit_fix(400, 2.0, 2.0);
        h.pump();
        assert_eq!(h.supervisor.location().unwrap().provider, "stored");
    }

    #[test]
    fn require_update_after_exhaustion_is_ignored() {
        let primary = ScriptedBackend::new("passive");
        let mut h = Harness::new(&primary, None);
        primary.emit_failure("gone");
        h.pump();

        h.supervisor.require_update();
        assert_eq!(primary.count(BackendCall::OneUpdate), 0);
    }
}
