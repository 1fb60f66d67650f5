//! Indexed in-memory store serving the engine's lookups.

use crate::model::Dataset;
use core::cell::{Cell, RefCell};
use futures::FutureExt as _;
use futures::future::{LocalBoxFuture, ready};
use log::{debug, info};
use overlay::{CardDataService, CardId, CardStats, DatasetUpdated, ServiceError, normalize_image_url};
use std::collections::HashMap;
use tokio::sync::broadcast;

const UPDATE_CHANNEL: usize = 16;

#[derive(Debug, Default)]
struct Index {
    version: Option<u64>,
    stats: HashMap<CardId, CardStats>,
    images: HashMap<String, CardId>,
}

impl Index {
    fn build(dataset: &Dataset) -> Self {
        let mut index = Self {
            version: Some(dataset.version),
            stats: HashMap::with_capacity(dataset.cards.len()),
            images: HashMap::with_capacity(dataset.cards.len()),
        };
        for card in &dataset.cards {
            index.stats.insert(card.id, card.stats());
            let Some(image) = card.image.as_deref() else {
                continue;
            };
            let normalized = normalize_image_url(image);
            if normalized.is_empty() {
                continue;
            }
            if let Some(first) = index.images.get(&normalized) {
                debug!("image {normalized} of card {} already maps to {first}", card.id);
                continue;
            }
            index.images.insert(normalized, card.id);
        }
        index
    }
}

/// Card data service backed by the current dataset.
///
/// The store answers `ping` with `true` once a dataset was loaded or it was marked ready, so an
/// engine can start against an empty store and wait for the first sync.
#[derive(Debug)]
pub struct DatasetStore {
    index: RefCell<Index>,
    ready: Cell<bool>,
    updates: broadcast::Sender<DatasetUpdated>,
}

impl Default for DatasetStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetStore {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL);
        Self {
            index: RefCell::new(Index::default()),
            ready: Cell::new(false),
            updates,
        }
    }

    /// A ready store holding `dataset`.
    pub fn from_dataset(dataset: &Dataset) -> Self {
        let store = Self::new();
        *store.index.borrow_mut() = Index::build(dataset);
        store.ready.set(true);
        store
    }

    /// Answer pings with `true` even before a dataset is loaded.
    pub fn mark_ready(&self) {
        self.ready.set(true);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.get()
    }

    /// Version of the loaded dataset.
    pub fn version(&self) -> Option<u64> {
        self.index.borrow().version
    }

    pub fn len(&self) -> usize {
        self.index.borrow().stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.borrow().stats.is_empty()
    }

    pub fn stats(&self, id: CardId) -> Option<CardStats> {
        self.index.borrow().stats.get(&id).copied()
    }

    /// Card id for an already normalized image URL.
    pub fn find_image(&self, normalized: &str) -> Option<CardId> {
        self.index.borrow().images.get(normalized).copied()
    }

    /// Swap in a new dataset and notify subscribers. Returns how many subscribers were told.
    pub fn replace(&self, dataset: &Dataset) -> usize {
        let index = Index::build(dataset);
        info!(
            "dataset v{} loaded: {} cards, {} images",
            dataset.version,
            index.stats.len(),
            index.images.len()
        );
        *self.index.borrow_mut() = index;
        self.ready.set(true);
        self.updates
            .send(DatasetUpdated {
                version: dataset.version,
            })
            .unwrap_or(0)
    }
}

impl CardDataService for DatasetStore {
    fn ping(&self) -> LocalBoxFuture<'_, Result<bool, ServiceError>> {
        ready(Ok(self.is_ready())).boxed_local()
    }

    fn cards_count(&self) -> LocalBoxFuture<'_, Result<usize, ServiceError>> {
        ready(Ok(self.len())).boxed_local()
    }

    fn card_stats(&self, id: CardId) -> LocalBoxFuture<'_, Result<Option<CardStats>, ServiceError>> {
        ready(Ok(self.stats(id))).boxed_local()
    }

    fn find_card_by_image<'a>(
        &'a self,
        normalized: &'a str,
    ) -> LocalBoxFuture<'a, Result<Option<CardId>, ServiceError>> {
        ready(Ok(self.find_image(normalized))).boxed_local()
    }

    fn subscribe(&self) -> broadcast::Receiver<DatasetUpdated> {
        self.updates.subscribe()
    }
}
