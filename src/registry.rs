//! Subscriber registry and fan-out

use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::types::{AddressSnapshot, LocationSnapshot};

/// Callback surface for location consumers.
///
/// Callbacks run on the driver task, synchronously with the update that
/// triggered them. They must return quickly and must not block on the
/// handle that delivers them.
pub trait LocationSubscriber: Send + Sync {
    fn on_location_changed(&self, location: &LocationSnapshot);

    fn on_address_changed(&self, _address: &AddressSnapshot) {}

    fn on_provider_error(&self, _error: &ErrorEvent) {}
}

/// Registration handle returned by `subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscriber#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Primary and fallback sources both failed; no more locations will come
    ProvidersExhausted,

    /// One reverse-geocoding call failed; later ones may succeed
    Enrichment,
}

/// Error delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorEvent {
    pub fn providers_exhausted(message: impl Into<String>) -> Self {
        Self { kind: ErrorKind::ProvidersExhausted, message: message.into() }
    }

    pub fn enrichment(message: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Enrichment, message: message.into() }
    }

    /// Whether the location pipeline can still produce updates.
    pub fn is_fatal(&self) -> bool {
        self.kind == ErrorKind::ProvidersExhausted
    }
}

impl fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::ProvidersExhausted => write!(f, "providers exhausted: {}", self.message),
            ErrorKind::Enrichment => write!(f, "enrichment failed: {}", self.message),
        }
    }
}

/// Ordered, de-duplicated subscriber list.
///
/// Identity is `Arc` pointer identity. Entries are kept alive until they are
/// unsubscribed.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: Vec<(SubscriberId, Arc<dyn LocationSubscriber>)>,
    next_id: u64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `subscriber`; a subscriber already present keeps its id.
    pub fn subscribe(&mut self, subscriber: Arc<dyn LocationSubscriber>) -> SubscriberId {
        if let Some((id, _)) = self.entries.iter().find(|(_, s)| same_subscriber(s, &subscriber)) {
            trace!(%id, "Subscriber already registered");
            return *id;
        }

        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, subscriber));
        debug!(%id, count = self.entries.len(), "Subscriber registered");
        id
    }

    /// Remove a subscriber. Returns false when it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        let removed = self.entries.len() != before;
        if removed {
            debug!(%id, count = self.entries.len(), "Subscriber removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn notify_location(&self, location: &LocationSnapshot) {
        for (_, subscriber) in &self.entries {
            subscriber.on_location_changed(location);
        }
    }

    pub fn notify_address(&self, address: &AddressSnapshot) {
        for (_, subscriber) in &self.entries {
            subscriber.on_address_changed(address);
        }
    }

    pub fn notify_error(&self, error: &ErrorEvent) {
        for (_, subscriber) in &self.entries {
            subscriber.on_provider_error(error);
        }
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("ids", &self.entries.iter().map(|(id, _)| *id).collect::<Vec<_>>())
            .finish()
    }
}

// Compare data pointers only; vtable pointers may differ across codegen units.
fn same_subscriber(a: &Arc<dyn LocationSubscriber>, b: &Arc<dyn LocationSubscriber>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{Recorded, RecordingSubscriber, brussels_components, snapshot};
    use std::sync::Mutex;

    #[test]
    fn duplicate_subscribe_is_a_no_op() {
        let mut registry = SubscriptionRegistry::new();
        let subscriber = RecordingSubscriber::new();

        let first = registry.subscribe(subscriber.clone());
        let second = registry.subscribe(subscriber.clone());
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);

        registry.notify_location(&snapshot("gps", 1, 1.0, 1.0));
        assert_eq!(subscriber.locations().len(), 1);
    }

    #[test]
    fn unsubscribe_unknown_is_a_no_op() {
        let mut registry = SubscriptionRegistry::new();
        let id = registry.subscribe(RecordingSubscriber::new());

        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn resubscribing_after_removal_gets_new_id() {
        let mut registry = SubscriptionRegistry::new();
        let subscriber = RecordingSubscriber::new();
        let first = registry.subscribe(subscriber.clone());
        registry.unsubscribe(first);
        let second = registry.subscribe(subscriber);
        assert_ne!(first, second);
    }

    struct Ordered {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl LocationSubscriber for Ordered {
        fn on_location_changed(&self, _location: &LocationSnapshot) {
            self.log.lock().unwrap().push(self.name);
        }
    }

    #[test]
    fn delivery_follows_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = SubscriptionRegistry::new();
        for name in ["a", "b", "c"] {
            registry.subscribe(Arc::new(Ordered { name, log: log.clone() }));
        }

        registry.notify_location(&snapshot("gps", 1, 1.0, 1.0));
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn every_event_kind_reaches_subscribers() {
        let mut registry = SubscriptionRegistry::new();
        let subscriber = RecordingSubscriber::new();
        registry.subscribe(subscriber.clone());

        let location = snapshot("gps", 5, 1.0, 1.0);
        let address = AddressSnapshot::from_location(location.clone(), brussels_components());
        let error = ErrorEvent::enrichment("timeout");

        registry.notify_location(&location);
        registry.notify_address(&address);
        registry.notify_error(&error);

        assert_eq!(
            subscriber.events(),
            vec![Recorded::Location(location), Recorded::Address(address), Recorded::Error(error)]
        );
    }

    #[test]
    fn default_callbacks_are_optional() {
        struct LocationsOnly;
        impl LocationSubscriber for LocationsOnly {
            fn on_location_changed(&self, _location: &LocationSnapshot) {}
        }

        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(Arc::new(LocationsOnly));
        registry.notify_error(&ErrorEvent::providers_exhausted("all failed"));
    }

    #[test]
    fn error_event_display_and_fatality() {
        let fatal = ErrorEvent::providers_exhausted("fallback error");
        assert!(fatal.is_fatal());
        assert_eq!(fatal.to_string(), "providers exhausted: fallback error");
        assert!(!ErrorEvent::enrichment("503").is_fatal());
    }
}
