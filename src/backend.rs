//! Boundary with concrete positioning backends
//!
//! A [`PositionBackend`] wraps one platform service (a fused location API, a
//! raw GPS/network manager, a simulator). Requests are issued synchronously and
//! return at once; fixes, failures and connection changes come back later
//! through the [`BackendCallback`] handed over in [`PositionBackend::start`].

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::trace;

use crate::types::{ConnectionState, LocationSnapshot, SourceRole, Timestamp};

/// Synchronous refusal of a backend request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendFailure {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("backend not connected")]
    NotConnected,

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Other(String),
}

/// Raw position as reported by a backend, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFix {
    pub provider: String,
    pub timestamp: Timestamp,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f32>,
    pub altitude: Option<f64>,
    pub speed: Option<f32>,
}

impl RawFix {
    pub fn new(provider: impl Into<String>, timestamp: Timestamp, latitude: f64, longitude: f64) -> Self {
        Self {
            provider: provider.into(),
            timestamp,
            latitude,
            longitude,
            accuracy: None,
            altitude: None,
            speed: None,
        }
    }

    pub fn with_accuracy(mut self, accuracy: f32) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    /// Normalize into a snapshot; `None` when the fix is incomplete.
    pub fn normalize(self) -> Option<LocationSnapshot> {
        let snapshot = LocationSnapshot::new(self.provider, self.timestamp, self.latitude, self.longitude)
            .with_accuracy(self.accuracy.filter(|a| a.is_finite()).unwrap_or(0.0))
            .with_altitude(self.altitude.filter(|a| a.is_finite()).unwrap_or(0.0))
            .with_speed(self.speed.filter(|s| s.is_finite()).unwrap_or(0.0));

        snapshot.has_valid_coordinates().then_some(snapshot)
    }
}

/// Asynchronous signal from a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// A position fix
    Fix(RawFix),

    /// Recoverable failure (service out of service, permission revoked, ...)
    Failure(String),

    /// The backend will never work again on this device
    Unavailable(String),

    /// Connection state change for backends with a connection phase
    Connection(ConnectionState),
}

/// Handle given to a backend to report events for one source.
#[derive(Debug, Clone)]
pub struct BackendCallback {
    role: SourceRole,
    tx: mpsc::UnboundedSender<(SourceRole, BackendEvent)>,
}

impl BackendCallback {
    pub fn new(role: SourceRole, tx: mpsc::UnboundedSender<(SourceRole, BackendEvent)>) -> Self {
        Self { role, tx }
    }

    pub fn role(&self) -> SourceRole {
        self.role
    }

    /// Send an event. Returns false once the receiving driver is gone.
    pub fn send(&self, event: BackendEvent) -> bool {
        trace!(role = ?self.role, ?event, "Backend event");
        self.tx.send((self.role, event)).is_ok()
    }

    pub fn fix(&self, fix: RawFix) -> bool {
        self.send(BackendEvent::Fix(fix))
    }

    pub fn failure(&self, reason: impl Into<String>) -> bool {
        self.send(BackendEvent::Failure(reason.into()))
    }

    pub fn unavailable(&self, reason: impl Into<String>) -> bool {
        self.send(BackendEvent::Unavailable(reason.into()))
    }

    pub fn connection(&self, state: ConnectionState) -> bool {
        self.send(BackendEvent::Connection(state))
    }
}

/// Concrete positioning backend.
///
/// All methods must return quickly; long work belongs on the backend's own
/// tasks, reporting through the callback.
pub trait PositionBackend: Send + 'static {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// Begin talking to the service. Returns the initial connection state;
    /// backends without a connection phase return `Connected`.
    fn start(&mut self, callback: BackendCallback) -> ConnectionState;

    /// Cached fix held by the platform, if any
    fn last_known_fix(&mut self) -> Option<RawFix> {
        None
    }

    /// Subscribe to opportunistic, low-power updates (replaces any active request)
    fn request_continuous_low_power_updates(&mut self) -> Result<(), BackendFailure>;

    /// Ask for one high-accuracy fix (replaces the passive subscription until delivered)
    fn request_one_update(&mut self) -> Result<(), BackendFailure>;

    /// Remove every subscription; no events may follow except connection changes
    fn stop(&mut self) -> Result<(), BackendFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_fills_missing_measurements() {
        let fix = RawFix::new("gps", Timestamp::from_millis(7), 50.0, 4.0);
        let snapshot = fix.normalize().unwrap();
        assert_eq!(snapshot.accuracy, 0.0);
        assert_eq!(snapshot.altitude, 0.0);
        assert_eq!(snapshot.speed, 0.0);
        assert_eq!(snapshot.timestamp, Timestamp::from_millis(7));
    }

    #[test]
    fn normalize_rejects_incomplete_fixes() {
        assert!(RawFix::new("gps", Timestamp::from_millis(1), f64::NAN, 4.0).normalize().is_none());
        assert!(RawFix::new("gps", Timestamp::from_millis(1), 50.0, 200.0).normalize().is_none());
    }

    #[tokio::test]
    async fn callback_tags_events_with_role() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let callback = BackendCallback::new(SourceRole::Fallback, tx);

        assert!(callback.failure("gps off"));
        let (role, event) = rx.recv().await.unwrap();
        assert_eq!(role, SourceRole::Fallback);
        assert_eq!(event, BackendEvent::Failure("gps off".to_string()));

        drop(rx);
        assert!(!callback.connection(ConnectionState::Connected));
    }
}
