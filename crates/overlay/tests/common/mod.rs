#![allow(dead_code, reason = "each integration test binary uses a different subset")]

use core::cell::{Cell, RefCell};
use core::time::Duration;
use dom::{Document, InteractionKind, NodeId, Rect, SharedDocument};
use futures::future::LocalBoxFuture;
use overlay::{
    CardDataService, CardId, CardStats, DatasetUpdated, Engine, OVERLAY_CLASS, OverlayConfig,
    ServiceError,
};
use std::collections::HashMap;
use std::rc::Rc;
use tokio::sync::broadcast;
use tokio::time::sleep;
use url::Url;

pub const CATALOG_URL: &str = "https://cards.example/cards";
pub const TRADE_URL: &str = "https://cards.example/trades/create";
pub const MELT_URL: &str = "https://cards.example/melt";
pub const LOOTBOX_URL: &str = "https://cards.example/packs/open";

pub const CARD_WIDTH: f64 = 240.0;
pub const CARD_HEIGHT: f64 = 340.0;
const COLUMNS: usize = 5;
const GAP: f64 = 10.0;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Statistics used for card `id` throughout the tests.
pub fn stats_for(id: CardId) -> CardStats {
    CardStats {
        owners: id * 3,
        wants: id * 2,
        trades: id,
    }
}

/// In-memory card data service with call accounting and optional latency.
pub struct MockService {
    stats: RefCell<HashMap<CardId, CardStats>>,
    images: RefCell<HashMap<String, CardId>>,
    latency: Cell<Duration>,
    ready: Cell<bool>,
    reachable: Cell<bool>,
    pings: Cell<usize>,
    stats_calls: RefCell<HashMap<CardId, usize>>,
    image_calls: Cell<usize>,
    version: Cell<u64>,
    updates: broadcast::Sender<DatasetUpdated>,
}

impl MockService {
    pub fn new() -> Rc<Self> {
        let (updates, _) = broadcast::channel(16);
        Rc::new(Self {
            stats: RefCell::new(HashMap::new()),
            images: RefCell::new(HashMap::new()),
            latency: Cell::new(Duration::ZERO),
            ready: Cell::new(true),
            reachable: Cell::new(true),
            pings: Cell::new(0),
            stats_calls: RefCell::new(HashMap::new()),
            image_calls: Cell::new(0),
            version: Cell::new(1),
            updates,
        })
    }

    /// A service knowing cards `1..=count`.
    pub fn with_cards(count: CardId) -> Rc<Self> {
        let service = Self::new();
        for id in 1..=count {
            service.set_stats(id, stats_for(id));
        }
        service
    }

    pub fn set_stats(&self, id: CardId, stats: CardStats) {
        self.stats.borrow_mut().insert(id, stats);
    }

    pub fn add_image(&self, normalized: &str, id: CardId) {
        self.images.borrow_mut().insert(normalized.to_owned(), id);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency.set(latency);
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.set(ready);
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.set(reachable);
    }

    pub fn pings(&self) -> usize {
        self.pings.get()
    }

    pub fn stats_calls(&self, id: CardId) -> usize {
        self.stats_calls.borrow().get(&id).copied().unwrap_or(0)
    }

    pub fn total_stats_calls(&self) -> usize {
        self.stats_calls.borrow().values().sum()
    }

    pub fn image_calls(&self) -> usize {
        self.image_calls.get()
    }

    /// Swap in new statistics and broadcast the dataset update.
    pub fn publish(&self, stats: HashMap<CardId, CardStats>) {
        *self.stats.borrow_mut() = stats;
        let version = self.version.get() + 1;
        self.version.set(version);
        let _ = self.updates.send(DatasetUpdated { version });
    }

    fn check(&self) -> Result<(), ServiceError> {
        if self.reachable.get() {
            Ok(())
        } else {
            Err(ServiceError::Unavailable(String::from("mock is offline")))
        }
    }
}

impl CardDataService for MockService {
    fn ping(&self) -> LocalBoxFuture<'_, Result<bool, ServiceError>> {
        self.pings.set(self.pings.get() + 1);
        Box::pin(async move {
            self.check()?;
            Ok(self.ready.get())
        })
    }

    fn cards_count(&self) -> LocalBoxFuture<'_, Result<usize, ServiceError>> {
        Box::pin(async move {
            self.check()?;
            Ok(self.stats.borrow().len())
        })
    }

    fn card_stats(&self, id: CardId) -> LocalBoxFuture<'_, Result<Option<CardStats>, ServiceError>> {
        *self.stats_calls.borrow_mut().entry(id).or_default() += 1;
        Box::pin(async move {
            let latency = self.latency.get();
            if !latency.is_zero() {
                sleep(latency).await;
            }
            self.check()?;
            Ok(self.stats.borrow().get(&id).copied())
        })
    }

    fn find_card_by_image<'a>(
        &'a self,
        normalized: &'a str,
    ) -> LocalBoxFuture<'a, Result<Option<CardId>, ServiceError>> {
        self.image_calls.set(self.image_calls.get() + 1);
        Box::pin(async move {
            let latency = self.latency.get();
            if !latency.is_zero() {
                sleep(latency).await;
            }
            self.check()?;
            Ok(self.images.borrow().get(normalized).copied())
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<DatasetUpdated> {
        self.updates.subscribe()
    }
}

/// An empty page with a tall viewport so that every laid-out card is admitted.
pub fn page(url: &str) -> SharedDocument {
    let mut doc = Document::new(Url::parse(url).unwrap());
    doc.set_viewport_size(1280.0, 100_000.0);
    doc.into_shared()
}

/// Box of grid slot `index`.
pub fn slot(index: usize) -> Rect {
    let column = (index % COLUMNS) as f64;
    let row = (index / COLUMNS) as f64;
    Rect::new(
        column * (CARD_WIDTH + GAP),
        row * (CARD_HEIGHT + GAP),
        CARD_WIDTH,
        CARD_HEIGHT,
    )
}

/// A container appended to the body.
pub fn container(doc: &SharedDocument, class: &str) -> NodeId {
    let mut doc = doc.borrow_mut();
    let node = doc.create_element_with("div", &[("class", class)]);
    let body = doc.body();
    doc.append_child(body, node).unwrap();
    doc.set_rect(node, Rect::new(0.0, 0.0, 1280.0, 100_000.0));
    node
}

/// Append a catalog card for `id` at grid slot `index`.
pub fn catalog_card(doc: &SharedDocument, parent: NodeId, id: CardId, index: usize) -> NodeId {
    let mut doc = doc.borrow_mut();
    let id_text = id.to_string();
    let name = format!("Card {id}");
    let card = doc.create_element_with(
        "div",
        &[
            ("class", "card-item"),
            ("data-card-id", id_text.as_str()),
            ("data-card-name", name.as_str()),
        ],
    );
    doc.append_child(parent, card).unwrap();
    doc.set_rect(card, slot(index));
    card
}

/// Append `count` catalog cards with ids `1..=count`.
pub fn catalog_grid(doc: &SharedDocument, parent: NodeId, count: usize) -> Vec<NodeId> {
    (0..count)
        .map(|index| catalog_card(doc, parent, index as CardId + 1, index))
        .collect()
}

/// Append a trade item whose id sits on a wrapper child.
pub fn trade_card(doc: &SharedDocument, parent: NodeId, id: CardId, index: usize) -> NodeId {
    let mut doc = doc.borrow_mut();
    let id_text = id.to_string();
    let item = doc.create_element_with("div", &[("class", "trade__item")]);
    let inner = doc.create_element_with(
        "div",
        &[("class", "trade__item-card"), ("data-card-id", id_text.as_str())],
    );
    doc.append_child(item, inner).unwrap();
    doc.append_child(parent, item).unwrap();
    doc.set_rect(item, slot(index));
    item
}

/// Append a disassembly card identified only by its image.
pub fn melt_card(doc: &SharedDocument, parent: NodeId, image: &str, index: usize) -> NodeId {
    let mut doc = doc.borrow_mut();
    let card = doc.create_element_with("div", &[("class", "melt__card")]);
    let img = doc.create_element_with("img", &[("class", "melt__card-image"), ("src", image)]);
    doc.append_child(card, img).unwrap();
    doc.append_child(parent, card).unwrap();
    doc.set_rect(card, slot(index));
    card
}

/// Append an opened lootbox card identified only by its image.
pub fn lootbox_card(doc: &SharedDocument, parent: NodeId, image: &str, index: usize) -> NodeId {
    let mut doc = doc.borrow_mut();
    let card = doc.create_element_with("div", &[("class", "lootbox__card")]);
    let img = doc.create_element_with("img", &[("src", image)]);
    doc.append_child(card, img).unwrap();
    doc.append_child(parent, card).unwrap();
    doc.set_rect(card, slot(index));
    card
}

/// Overlay roots currently attached to the document.
pub fn overlays_in(doc: &SharedDocument) -> Vec<NodeId> {
    let doc = doc.borrow();
    let list = card_selectors::SelectorList::parse(&format!(".{OVERLAY_CLASS}"));
    doc.query_selector_all(doc.root(), &list)
}

/// Overlay roots attached inside `card`.
pub fn overlays_on(doc: &SharedDocument, card: NodeId) -> usize {
    let doc = doc.borrow();
    doc.element_children(card)
        .into_iter()
        .filter(|&child| doc.has_class(child, OVERLAY_CLASS))
        .count()
}

pub fn interact(doc: &SharedDocument) {
    doc.borrow_mut().interact(InteractionKind::Pointer);
}

/// Config with the default timings.
pub fn config() -> OverlayConfig {
    OverlayConfig::default()
}

pub fn engine(doc: &SharedDocument, service: &Rc<MockService>, config: OverlayConfig) -> Engine {
    let service: Rc<dyn CardDataService> = Rc::clone(service) as Rc<dyn CardDataService>;
    Engine::new(Rc::clone(doc), service, config)
}

/// Let spawned tasks and timers run for `millis` of paused time.
pub async fn settle(millis: u64) {
    sleep(Duration::from_millis(millis)).await;
}
