//! Process-local memoization of stats and image lookups.

use crate::error::ServiceError;
use crate::service::{CardId, CardStats};
use core::fmt;
use futures::FutureExt as _;
use futures::future::{LocalBoxFuture, Shared};
use std::collections::HashMap;

/// Id to stats cache. Holds positive results only and is cleared on dataset updates.
#[derive(Debug, Default)]
pub struct StatsCache {
    entries: HashMap<CardId, CardStats>,
}

impl StatsCache {
    pub fn get(&self, id: CardId) -> Option<CardStats> {
        self.entries.get(&id).copied()
    }

    pub fn insert(&mut self, id: CardId, stats: CardStats) {
        self.entries.insert(id, stats);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of one image lookup, shareable between concurrent callers.
pub type ImageLookup = Shared<LocalBoxFuture<'static, Result<Option<CardId>, ServiceError>>>;

/// Normalized image URL to id cache plus the map of lookups still in flight.
///
/// Image URLs are stable for a card, so entries are never invalidated by dataset updates.
#[derive(Default)]
pub struct ImageIdCache {
    resolved: HashMap<String, CardId>,
    in_flight: HashMap<String, ImageLookup>,
}

impl fmt::Debug for ImageIdCache {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ImageIdCache")
            .field("resolved", &self.resolved.len())
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

impl ImageIdCache {
    pub fn get(&self, normalized: &str) -> Option<CardId> {
        self.resolved.get(normalized).copied()
    }

    pub fn insert(&mut self, normalized: String, id: CardId) {
        self.resolved.insert(normalized, id);
    }

    /// The lookup already running for `normalized`, if any.
    pub fn in_flight(&self, normalized: &str) -> Option<ImageLookup> {
        self.in_flight.get(normalized).cloned()
    }

    /// Register a new lookup and return the shared handle all callers await.
    pub fn start(
        &mut self,
        normalized: String,
        lookup: LocalBoxFuture<'static, Result<Option<CardId>, ServiceError>>,
    ) -> ImageLookup {
        let shared = lookup.shared();
        self.in_flight.insert(normalized, shared.clone());
        shared
    }

    /// Record the outcome of `lookup`. Only positive results are kept.
    ///
    /// `lookup` must be a handle that was not polled itself; a newer lookup registered
    /// under the same key stays in flight.
    pub fn finish(
        &mut self,
        normalized: &str,
        lookup: &ImageLookup,
        outcome: &Result<Option<CardId>, ServiceError>,
    ) {
        if self
            .in_flight
            .get(normalized)
            .is_some_and(|current| current.ptr_eq(lookup))
        {
            self.in_flight.remove(normalized);
        }
        if let Ok(Some(id)) = outcome {
            self.resolved.insert(normalized.to_owned(), *id);
        }
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }

    /// Drop resolved entries and forget lookups in flight.
    pub fn clear(&mut self) {
        self.resolved.clear();
        self.in_flight.clear();
    }
}
