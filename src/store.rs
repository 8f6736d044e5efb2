//! Last-known location storage
//!
//! The driver persists the accepted location and the user's virtual location
//! as v1 records (see [`crate::record`]). Storage itself is host-provided;
//! [`MemoryStore`] covers tests and hosts without durable storage.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Slot in a [`LastKnownStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// Last location accepted from a source
    LastLocation,

    /// User-chosen location
    VirtualLocation,
}

impl StoreKey {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreKey::LastLocation => "last_location",
            StoreKey::VirtualLocation => "virtual_location",
        }
    }
}

/// String storage for encoded records.
///
/// Called from the driver task; implementations should return quickly.
pub trait LastKnownStore: Send + Sync {
    fn load(&self, key: StoreKey) -> Option<String>;

    fn save(&self, key: StoreKey, record: &str);
}

/// In-memory [`LastKnownStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<StoreKey, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with one record.
    pub fn with_record(key: StoreKey, record: impl Into<String>) -> Self {
        let store = Self::new();
        store.save(key, &record.into());
        store
    }

    fn records(&self) -> MutexGuard<'_, HashMap<StoreKey, String>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LastKnownStore for MemoryStore {
    fn load(&self, key: StoreKey) -> Option<String> {
        self.records().get(&key).cloned()
    }

    fn save(&self, key: StoreKey, record: &str) {
        self.records().insert(key, record.to_string());
    }
}
