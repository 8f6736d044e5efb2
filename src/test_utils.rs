//! Test doubles for backends, subscribers and geocoders
//!
//! Used by the unit tests and the benchmarks. Every double shares its state
//! behind an `Arc`, so a test keeps a clone as a probe after handing the
//! original to the code under test.

#![cfg(any(test, feature = "benchmark"))]

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::backend::{BackendCallback, BackendEvent, BackendFailure, PositionBackend, RawFix};
use crate::geocoder::ReverseGeocoder;
use crate::registry::{ErrorEvent, LocationSubscriber};
use crate::types::{
    AddressComponent, AddressComponents, AddressSnapshot, ConnectionState, LocationSnapshot,
    Timestamp,
};
use crate::{LocationError, Result};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Build a fix for `millis` at the given coordinates.
pub fn fix(provider: &str, millis: i64, latitude: f64, longitude: f64) -> RawFix {
    RawFix::new(provider, Timestamp::from_millis(millis), latitude, longitude)
}

/// Build a snapshot for `millis` at the given coordinates.
pub fn snapshot(provider: &str, millis: i64, latitude: f64, longitude: f64) -> LocationSnapshot {
    LocationSnapshot::new(provider, Timestamp::from_millis(millis), latitude, longitude)
}

/// Components for a Brussels address.
pub fn brussels_components() -> AddressComponents {
    AddressComponents::new()
        .with(AddressComponent::Country, "Belgium", "BE")
        .with(AddressComponent::Agglomeration, "Bruxelles", "BXL")
        .with(AddressComponent::Locality, "Etterbeek", "")
}

/// Request observed by a [`ScriptedBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendCall {
    Start,
    ContinuousLowPower,
    OneUpdate,
    Stop,
}

#[derive(Debug)]
struct ScriptState {
    callback: Option<BackendCallback>,
    calls: Vec<BackendCall>,
    refusal: Option<BackendFailure>,
    last_known: Option<RawFix>,
    initial_connection: ConnectionState,
}

/// Backend driven by the test.
#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    name: String,
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedBackend {
    /// Backend that is connected as soon as it starts.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_connection(name, ConnectionState::Connected)
    }

    /// Backend that reports `Connecting` and waits for [`ScriptedBackend::connect`].
    pub fn connecting(name: impl Into<String>) -> Self {
        Self::with_connection(name, ConnectionState::Connecting)
    }

    fn with_connection(name: impl Into<String>, initial_connection: ConnectionState) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(ScriptState {
                callback: None,
                calls: Vec::new(),
                refusal: None,
                last_known: None,
                initial_connection,
            })),
        }
    }

    /// Serve `fix` as the platform's cached location.
    pub fn with_last_known(self, fix: RawFix) -> Self {
        lock(&self.state).last_known = Some(fix);
        self
    }

    /// Make every following request fail with `failure`.
    pub fn refuse_requests(&self, failure: BackendFailure) {
        lock(&self.state).refusal = Some(failure);
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        lock(&self.state).calls.clone()
    }

    pub fn count(&self, call: BackendCall) -> usize {
        lock(&self.state).calls.iter().filter(|c| **c == call).count()
    }

    /// Whether the backend has been started by a source.
    pub fn is_started(&self) -> bool {
        lock(&self.state).callback.is_some()
    }

    /// Send an event through the callback. False if not started or the driver is gone.
    pub fn emit(&self, event: BackendEvent) -> bool {
        let callback = lock(&self.state).callback.clone();
        callback.map(|cb| cb.send(event)).unwrap_or(false)
    }

    pub fn emit_fix(&self, millis: i64, latitude: f64, longitude: f64) -> bool {
        let name = self.name.clone();
        self.emit(BackendEvent::Fix(fix(&name, millis, latitude, longitude)))
    }

    pub fn emit_failure(&self, reason: &str) -> bool {
        self.emit(BackendEvent::Failure(reason.to_string()))
    }

    pub fn connect(&self) -> bool {
        self.emit(BackendEvent::Connection(ConnectionState::Connected))
    }

    fn request(&self, call: BackendCall) -> std::result::Result<(), BackendFailure> {
        let mut state = lock(&self.state);
        state.calls.push(call);
        match &state.refusal {
            Some(failure) => Err(failure.clone()),
            None => Ok(()),
        }
    }
}

impl PositionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, callback: BackendCallback) -> ConnectionState {
        let mut state = lock(&self.state);
        state.calls.push(BackendCall::Start);
        state.callback = Some(callback);
        state.initial_connection
    }

    fn last_known_fix(&mut self) -> Option<RawFix> {
        lock(&self.state).last_known.clone()
    }

    fn request_continuous_low_power_updates(&mut self) -> std::result::Result<(), BackendFailure> {
        self.request(BackendCall::ContinuousLowPower)
    }

    fn request_one_update(&mut self) -> std::result::Result<(), BackendFailure> {
        self.request(BackendCall::OneUpdate)
    }

    fn stop(&mut self) -> std::result::Result<(), BackendFailure> {
        self.request(BackendCall::Stop)
    }
}

/// Event captured by a [`RecordingSubscriber`].
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Location(LocationSnapshot),
    Address(AddressSnapshot),
    Error(ErrorEvent),
}

/// Subscriber that keeps every callback it receives.
#[derive(Debug, Default)]
pub struct RecordingSubscriber {
    events: Mutex<Vec<Recorded>>,
}

impl RecordingSubscriber {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Recorded> {
        lock(&self.events).clone()
    }

    pub fn locations(&self) -> Vec<LocationSnapshot> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Recorded::Location(l) => Some(l),
                _ => None,
            })
            .collect()
    }

    pub fn addresses(&self) -> Vec<AddressSnapshot> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Recorded::Address(a) => Some(a),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<ErrorEvent> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Recorded::Error(err) => Some(err),
                _ => None,
            })
            .collect()
    }
}

impl LocationSubscriber for RecordingSubscriber {
    fn on_location_changed(&self, location: &LocationSnapshot) {
        lock(&self.events).push(Recorded::Location(location.clone()));
    }

    fn on_address_changed(&self, address: &AddressSnapshot) {
        lock(&self.events).push(Recorded::Address(address.clone()));
    }

    fn on_provider_error(&self, error: &ErrorEvent) {
        lock(&self.events).push(Recorded::Error(error.clone()));
    }
}

/// Geocoder whose calls complete only when the test releases them.
#[derive(Debug)]
pub struct ScriptedGeocoder {
    calls: Mutex<Vec<LocationSnapshot>>,
    gate: Semaphore,
    failure: Mutex<Option<String>>,
    components: AddressComponents,
}

impl ScriptedGeocoder {
    /// Every call answers at once with a Brussels address.
    pub fn immediate() -> Arc<Self> {
        Arc::new(Self::build(Semaphore::MAX_PERMITS))
    }

    /// Calls wait for [`ScriptedGeocoder::release`].
    pub fn gated() -> Arc<Self> {
        Arc::new(Self::build(0))
    }

    fn build(permits: usize) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            gate: Semaphore::new(permits),
            failure: Mutex::new(None),
            components: brussels_components(),
        }
    }

    /// Let `n` pending or future calls complete.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Make following calls fail with `message` (`None` to succeed again).
    pub fn fail_with(&self, message: Option<&str>) {
        *lock(&self.failure) = message.map(str::to_string);
    }

    pub fn calls(&self) -> Vec<LocationSnapshot> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

#[async_trait]
impl ReverseGeocoder for ScriptedGeocoder {
    async fn code(&self, location: &LocationSnapshot) -> Result<AddressComponents> {
        lock(&self.calls).push(location.clone());

        let permit =
            self.gate.acquire().await.map_err(|e| LocationError::enrichment_failed(e.to_string()))?;
        permit.forget();

        match lock(&self.failure).clone() {
            Some(message) => Err(LocationError::enrichment_failed(message)),
            None => Ok(self.components.clone()),
        }
    }
}

/// Poll `condition` until it holds, for at most two seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Give spawned tasks a chance to run before a negative assertion.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(30)).await;
}
