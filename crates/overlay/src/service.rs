//! The card data service the engine consumes.

use crate::error::ServiceError;
use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use url::Url;

/// Numeric card identifier of the host site.
pub type CardId = u32;

/// Statistics snapshot for one card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CardStats {
    pub owners: u32,
    pub wants: u32,
    pub trades: u32,
}

/// Notification that the dataset behind the service was replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetUpdated {
    pub version: u64,
}

/// Lookup service backed by the local dataset.
///
/// All methods are called from the engine's single thread; futures are not `Send`.
pub trait CardDataService {
    /// Liveness check; `Ok(false)` means reachable but not ready yet.
    fn ping(&self) -> LocalBoxFuture<'_, Result<bool, ServiceError>>;

    /// Number of cards in the current dataset.
    fn cards_count(&self) -> LocalBoxFuture<'_, Result<usize, ServiceError>>;

    /// Statistics for a card; `Ok(None)` when the dataset has no entry.
    fn card_stats(&self, id: CardId) -> LocalBoxFuture<'_, Result<Option<CardStats>, ServiceError>>;

    /// Card id for a normalized image URL (see [`normalize_image_url`]).
    fn find_card_by_image<'a>(
        &'a self,
        normalized: &'a str,
    ) -> LocalBoxFuture<'a, Result<Option<CardId>, ServiceError>>;

    /// Subscribe to dataset replacement notifications.
    fn subscribe(&self) -> broadcast::Receiver<DatasetUpdated>;
}

/// Origin that relative image URLs resolve against when no page URL is at hand.
const IMAGE_ORIGIN: &str = "https://images.invalid/";

/// Normalize an image URL for fingerprint lookups.
///
/// Keeps only the path, without its leading slash, so that
/// `https://cdn.example/images/cards/a.webp?v=2` becomes `images/cards/a.webp`. Relative
/// URLs are taken as relative to the site root.
pub fn normalize_image_url(raw: &str) -> String {
    Url::parse(IMAGE_ORIGIN)
        .map(|origin| normalize_image_url_against(&origin, raw))
        .unwrap_or_default()
}

/// Normalize an image `src` the way the page at `base` would load it.
///
/// Empty sources and URLs without a hierarchical path (`data:` and the like) normalize to
/// an empty string.
pub fn normalize_image_url_against(base: &Url, raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    base.join(trimmed)
        .ok()
        .filter(|url| !url.cannot_be_a_base())
        .map(|url| url.path().trim_start_matches('/').to_owned())
        .unwrap_or_default()
}

/// Trailing path segment of an image URL, used as the fingerprint guard key.
pub fn image_fingerprint(raw: &str) -> Option<String> {
    let normalized = normalize_image_url(raw);
    normalized
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_owned)
}
