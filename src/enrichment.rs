//! Address enrichment decisions
//!
//! [`EnrichmentCoordinator`] decides when a reverse-geocoding call is worth
//! making and keeps at most one in flight. It performs no I/O: callers get
//! back the location to geocode and report the result later.

use std::time::Duration;
use tracing::{debug, trace};

use crate::types::{AddressSnapshot, Fresh, LocationSnapshot, Timestamp, supersedes};

/// Result of an explicit address request.
#[derive(Debug, Clone, PartialEq)]
pub enum AddressRequest {
    /// Geocode this location now
    Enrich(LocationSnapshot),

    /// No location is held; request one and enrich when it arrives
    NeedLocation,

    /// A call is in flight; a follow-up runs when it completes
    Deferred,
}

/// What to do after a geocoding call completed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnrichmentOutcome {
    /// Address to publish, if it passed the freshness rule
    pub accepted: Option<AddressSnapshot>,

    /// Location to geocode next because a request arrived meanwhile
    pub follow_up: Option<LocationSnapshot>,
}

#[derive(Debug)]
pub struct EnrichmentCoordinator {
    last_address: Option<AddressSnapshot>,
    is_enriching: bool,
    force_next: bool,
    max_staleness: Duration,
}

impl EnrichmentCoordinator {
    pub fn new(max_staleness: Duration) -> Self {
        Self { last_address: None, is_enriching: false, force_next: false, max_staleness }
    }

    pub fn address(&self) -> Option<&AddressSnapshot> {
        self.last_address.as_ref()
    }

    pub fn is_enriching(&self) -> bool {
        self.is_enriching
    }

    /// An explicit request is waiting to be served
    pub fn is_forced(&self) -> bool {
        self.force_next
    }

    /// Called for every accepted location. Returns the location to geocode.
    pub fn on_location(&mut self, location: &LocationSnapshot, now: Timestamp) -> Option<LocationSnapshot> {
        if self.is_enriching {
            trace!(timestamp = %location.timestamp, "Enrichment in flight, skipping trigger");
            return None;
        }

        if !self.should_enrich(now) {
            trace!(timestamp = %location.timestamp, "Held address still fresh");
            return None;
        }

        Some(self.begin(location))
    }

    /// Explicit address request against the currently held location.
    pub fn require_address_update(&mut self, current: Option<&LocationSnapshot>) -> AddressRequest {
        self.force_next = true;

        if self.is_enriching {
            debug!("Address requested while enriching, deferring");
            return AddressRequest::Deferred;
        }

        match current {
            Some(location) => AddressRequest::Enrich(self.begin(location)),
            None => {
                debug!("Address requested without a location, waiting for one");
                AddressRequest::NeedLocation
            }
        }
    }

    /// Record a successful call.
    pub fn complete_success(
        &mut self,
        address: AddressSnapshot,
        current: Option<&LocationSnapshot>,
    ) -> EnrichmentOutcome {
        self.is_enriching = false;

        let accepted = if supersedes(self.last_address.as_ref(), &address) {
            debug!(timestamp = %address.timestamp(), "Address accepted");
            self.last_address = Some(address.clone());
            Some(address)
        } else {
            debug!(timestamp = %address.timestamp(), "Dropping address that is not newer than the held one");
            None
        };

        EnrichmentOutcome { accepted, follow_up: self.follow_up(current) }
    }

    /// Record a failed call. The trigger is not retried.
    pub fn complete_failure(&mut self, current: Option<&LocationSnapshot>) -> Option<LocationSnapshot> {
        self.is_enriching = false;
        self.follow_up(current)
    }

    fn follow_up(&mut self, current: Option<&LocationSnapshot>) -> Option<LocationSnapshot> {
        match current {
            Some(location) if self.force_next => Some(self.begin(location)),
            _ => None,
        }
    }

    fn should_enrich(&self, now: Timestamp) -> bool {
        match &self.last_address {
            None => true,
            Some(_) if self.force_next => true,
            Some(address) => now.saturating_since(address.timestamp()) > self.max_staleness,
        }
    }

    fn begin(&mut self, location: &LocationSnapshot) -> LocationSnapshot {
        self.is_enriching = true;
        self.force_next = false;
        location.clone()
    }
}
