//! Position source driving a [`PositionBackend`]

use std::mem;
use tracing::{debug, info, trace, warn};

use crate::LocationError;
use crate::backend::{BackendCallback, BackendEvent, BackendFailure, PositionBackend, RawFix};
use crate::source::{PositionSource, SourceListener};
use crate::types::{ConnectionState, LocationSnapshot, ProviderState, SourceRole};

/// Source wrapping one backend.
///
/// Serves both the passive primary and the fallback slot. Requests issued
/// before the backend is connected are remembered and replayed on connect.
pub struct BackendSource<B: PositionBackend> {
    role: SourceRole,
    backend: B,
    state: ProviderState,
    connection: ConnectionState,
    location: Option<LocationSnapshot>,
    listener: Option<Box<dyn SourceListener>>,

    /// An active fix was requested and not delivered yet
    update_pending: bool,

    /// `require_update` was called while disconnected
    update_before_connect: bool,

    /// Start once the backend connects
    start_on_connect: bool,
}

impl<B: PositionBackend> BackendSource<B> {
    /// Create the source and start it as soon as the backend allows.
    pub fn new(
        role: SourceRole,
        backend: B,
        listener: Option<Box<dyn SourceListener>>,
        callback: BackendCallback,
    ) -> Self {
        let mut source = Self {
            role,
            backend,
            state: ProviderState::Initializing,
            connection: ConnectionState::Disconnected,
            location: None,
            listener,
            update_pending: false,
            update_before_connect: false,
            start_on_connect: true,
        };

        let connection = source.backend.start(callback);
        info!(role = ?role, backend = source.backend.name(), ?connection, "Position source created");
        source.on_connection_change(connection);
        source
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    fn set_state(&mut self, state: ProviderState) {
        if self.state == state || self.state.is_terminal() {
            return;
        }

        debug!(role = ?self.role, from = %self.state, to = %state, "Source state change");
        self.state = state;

        if let Some(listener) = &self.listener {
            listener.on_provider_state_change(state, self.role);
        }
    }

    fn fail(&mut self, operation: &str, failure: BackendFailure) {
        let next = match failure {
            BackendFailure::Unavailable(_) => ProviderState::Down,
            _ => ProviderState::Error,
        };
        let error = LocationError::from_backend_failure(self.role, failure);
        warn!(role = ?self.role, "{} failed: {}", operation, error);
        self.set_state(next);
    }

    fn accept_fix(&mut self, fix: RawFix) {
        let Some(location) = fix.normalize() else {
            warn!(role = ?self.role, "Dropping incomplete fix");
            return;
        };

        self.set_state(ProviderState::Started);
        trace!(role = ?self.role, timestamp = %location.timestamp, "Fix accepted by source");

        if let Some(listener) = &self.listener {
            listener.on_location_changed(&location, self.role);
        }
        self.location = Some(location);
    }

    fn on_connection_change(&mut self, connection: ConnectionState) {
        self.connection = connection;

        match connection {
            ConnectionState::Connected => {
                let wants_update = mem::take(&mut self.update_before_connect);
                let had_location = self.location.is_some();

                if self.start_on_connect {
                    self.start();
                }

                // A cached fix served on connect satisfies an early request
                let seeded = !had_location && self.location.is_some();
                if wants_update && !seeded {
                    self.require_update();
                }
            }
            ConnectionState::Connecting => {}
            ConnectionState::Disconnected => {
                // Suspended: resume on reconnect if we were running
                if self.state == ProviderState::Started {
                    self.start_on_connect = true;
                    self.update_pending = false;
                    self.set_state(ProviderState::Stopped);
                }
            }
            ConnectionState::Failed => {
                warn!(role = ?self.role, "Backend connection failed");
                self.set_state(ProviderState::Error);
            }
        }
    }
}

impl<B: PositionBackend> PositionSource for BackendSource<B> {
    fn role(&self) -> SourceRole {
        self.role
    }

    fn start(&mut self) {
        if matches!(self.state, ProviderState::Started | ProviderState::Down) {
            return;
        }

        if !self.connection.is_connected() {
            self.start_on_connect = true;
            return;
        }
        self.start_on_connect = false;

        if let Err(failure) = self.backend.request_continuous_low_power_updates() {
            self.fail("start", failure);
            return;
        }

        self.update_pending = false;
        self.set_state(ProviderState::Started);

        if self.location.is_none()
            && let Some(cached) = self.backend.last_known_fix()
        {
            debug!(role = ?self.role, "Seeding source with cached fix");
            self.accept_fix(cached);
        }
    }

    fn stop(&mut self) {
        if self.state == ProviderState::Down {
            return;
        }

        self.start_on_connect = false;
        self.update_before_connect = false;
        self.update_pending = false;

        if self.connection.is_connected()
            && let Err(failure) = self.backend.stop()
        {
            self.fail("stop", failure);
            return;
        }

        self.set_state(ProviderState::Stopped);
    }

    fn require_update(&mut self) {
        if self.state == ProviderState::Down || self.update_pending {
            return;
        }

        if !self.connection.is_connected() {
            debug!(role = ?self.role, "Update requested before connection, deferring");
            self.update_before_connect = true;
            return;
        }

        match self.backend.request_one_update() {
            Ok(()) => {
                debug!(role = ?self.role, "Active fix requested");
                self.update_pending = true;
                self.set_state(ProviderState::Started);
            }
            Err(failure) => self.fail("require_update", failure),
        }
    }

    fn location(&self) -> Option<&LocationSnapshot> {
        self.location.as_ref()
    }

    fn state(&self) -> ProviderState {
        self.state
    }

    fn set_listener(&mut self, listener: Option<Box<dyn SourceListener>>) {
        self.listener = listener;
    }

    fn handle_backend_event(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::Fix(fix) => {
                if matches!(self.state, ProviderState::Stopped | ProviderState::Down) {
                    trace!(role = ?self.role, state = %self.state, "Ignoring fix on inactive source");
                    return;
                }

                self.accept_fix(fix);

                // Back to passive once the active request is satisfied
                if mem::take(&mut self.update_pending)
                    && let Err(failure) = self.backend.request_continuous_low_power_updates()
                {
                    self.fail("re-arm passive updates", failure);
                }
            }
            BackendEvent::Failure(reason) => {
                warn!(role = ?self.role, "Backend failure: {}", reason);
                self.update_pending = false;
                self.set_state(ProviderState::Error);
            }
            BackendEvent::Unavailable(reason) => {
                warn!(role = ?self.role, "Backend permanently unavailable: {}", reason);
                self.set_state(ProviderState::Down);
            }
            BackendEvent::Connection(connection) => self.on_connection_change(connection),
        }
    }
}
