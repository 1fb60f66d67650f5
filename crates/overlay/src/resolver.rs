//! Card id extraction and the cached lookups behind it.

use crate::cache::{ImageIdCache, StatsCache};
use crate::descriptor::{CardDescriptor, IdExtraction};
use crate::error::ServiceError;
use crate::service::{CardDataService, CardId, CardStats, normalize_image_url_against};
use core::cell::{Cell, RefCell};
use dom::{Document, NodeId};
use futures::FutureExt as _;
use log::trace;
use std::rc::Rc;
use url::Url;

/// Synchronous part of id resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// The id is known (or known to be unavailable) without a lookup.
    Ready(Option<CardId>),
    /// The id has to be looked up by image.
    Image { raw: String, normalized: String },
}

/// Parse a card id attribute value. Zero and non-numeric values are not ids.
pub fn parse_card_id(value: &str) -> Option<CardId> {
    value.trim().parse::<CardId>().ok().filter(|id| *id != 0)
}

/// Read the id source of `element` according to its descriptor.
///
/// Image URLs are never mined for numeric path segments: those identify the card's
/// series, not the card.
pub fn extract(
    doc: &Document,
    element: NodeId,
    descriptor: &CardDescriptor,
    page_url: &Url,
) -> Extraction {
    match &descriptor.id_extraction {
        IdExtraction::DirectAttribute {
            attribute,
            wrapper_child,
        } => {
            let source = wrapper_child
                .as_ref()
                .and_then(|wrapper| doc.query_selector(element, wrapper))
                .unwrap_or(element);
            Extraction::Ready(
                doc.attribute(source, attribute)
                    .or_else(|| doc.attribute(element, attribute))
                    .and_then(parse_card_id),
            )
        }
        IdExtraction::UrlEmbeddedId {
            attribute,
            parameter,
        } => {
            let id = doc
                .attribute(element, attribute)
                .and_then(|href| page_url.join(href).ok())
                .and_then(|url| {
                    url.query_pairs()
                        .find(|(key, _)| key == parameter)
                        .and_then(|(_, value)| parse_card_id(&value))
                });
            Extraction::Ready(id)
        }
        IdExtraction::ImageFingerprint { image } => {
            let image_node = if doc.matches(element, image) {
                Some(element)
            } else {
                doc.query_selector(element, image)
            };
            let Some(src) = image_node.and_then(|node| doc.attribute(node, "src")) else {
                return Extraction::Ready(None);
            };
            let normalized = normalize_image_url_against(page_url, src);
            if normalized.is_empty() {
                Extraction::Ready(None)
            } else {
                Extraction::Image {
                    raw: src.to_owned(),
                    normalized,
                }
            }
        }
    }
}

/// Resolves ids and stats through the caches, falling back to the data service.
pub struct Resolver {
    service: Rc<dyn CardDataService>,
    images: RefCell<ImageIdCache>,
    stats: RefCell<StatsCache>,
    /// Bumped whenever the stats cache is invalidated, so late answers are not cached.
    generation: Cell<u64>,
    lookups: Cell<u64>,
}

impl Resolver {
    pub fn new(service: Rc<dyn CardDataService>) -> Self {
        Self {
            service,
            images: RefCell::new(ImageIdCache::default()),
            stats: RefCell::new(StatsCache::default()),
            generation: Cell::new(0),
            lookups: Cell::new(0),
        }
    }

    pub fn service(&self) -> &Rc<dyn CardDataService> {
        &self.service
    }

    /// Number of calls made to the data service.
    pub fn lookups(&self) -> u64 {
        self.lookups.get()
    }

    fn count_lookup(&self) {
        self.lookups.set(self.lookups.get().saturating_add(1));
    }

    /// Finish resolution of an extraction.
    ///
    /// # Errors
    /// Propagates data service failures of image lookups.
    pub async fn card_id(&self, extraction: &Extraction) -> Result<Option<CardId>, ServiceError> {
        match extraction {
            Extraction::Ready(id) => Ok(*id),
            Extraction::Image { normalized, .. } => self.image_id(normalized).await,
        }
    }

    /// Look up a card by normalized image URL. Concurrent lookups of the same URL share
    /// one service call.
    ///
    /// # Errors
    /// Propagates data service failures.
    pub async fn image_id(&self, normalized: &str) -> Result<Option<CardId>, ServiceError> {
        if let Some(id) = self.images.borrow().get(normalized) {
            trace!("image cache hit for {normalized}");
            return Ok(Some(id));
        }
        let existing = self.images.borrow().in_flight(normalized);
        let lookup = if let Some(lookup) = existing {
            lookup
        } else {
            self.count_lookup();
            let service = Rc::clone(&self.service);
            let key = normalized.to_owned();
            let request = async move { service.find_card_by_image(&key).await }.boxed_local();
            self.images
                .borrow_mut()
                .start(normalized.to_owned(), request)
        };
        let outcome = lookup.clone().await;
        self.images
            .borrow_mut()
            .finish(normalized, &lookup, &outcome);
        outcome
    }

    /// Statistics for a card, cached on success.
    ///
    /// # Errors
    /// Propagates data service failures.
    pub async fn stats(&self, id: CardId) -> Result<Option<CardStats>, ServiceError> {
        if let Some(stats) = self.stats.borrow().get(id) {
            return Ok(Some(stats));
        }
        let generation = self.generation.get();
        self.count_lookup();
        let stats = self.service.card_stats(id).await?;
        if let Some(found) = stats
            && generation == self.generation.get()
        {
            self.stats.borrow_mut().insert(id, found);
        }
        Ok(stats)
    }

    pub fn cached_stats(&self) -> usize {
        self.stats.borrow().len()
    }

    pub fn cached_images(&self) -> usize {
        self.images.borrow().len()
    }

    /// Drop cached stats after a dataset update. Image ids stay valid.
    pub fn invalidate_stats(&self) {
        self.generation.set(self.generation.get().wrapping_add(1));
        self.stats.borrow_mut().clear();
    }

    /// Drop everything, including image ids and lookups in flight.
    pub fn clear(&self) {
        self.invalidate_stats();
        self.images.borrow_mut().clear();
    }
}
