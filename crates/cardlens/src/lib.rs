//! Headless driver for the card overlay engine.
//!
//! Loads an HTML page fixture and a dataset, lays the cards out on a simple grid so that
//! visibility admission has real geometry to work with, runs the engine for a settle period
//! and reports the overlays it produced.

use anyhow::{Context as _, Error, anyhow};
use clap::Parser;
use core::time::Duration;
use dataset::{Dataset, DatasetStore, DatasetSync, SyncConfig, source_for};
use dom::{Document, NodeId, Rect, SharedDocument, parse_document};
use log::{info, warn};
use overlay::{
    CardDataService, CardStats, DescriptorTable, Engine, EngineCounters, OverlayConfig,
    OverlayLayout,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tokio::runtime::Builder;
use tokio::task::LocalSet;
use tokio::time::sleep;
use url::Url;

pub const CARD_WIDTH: f64 = 240.0;
pub const CARD_HEIGHT: f64 = 340.0;
const GAP: f64 = 10.0;

/// Run the card overlay engine against a page fixture
#[derive(Parser, Debug, Clone)]
#[command(name = "cardlens", version, about)]
pub struct Args {
    /// HTML page fixture
    #[arg(long)]
    pub page: PathBuf,

    /// URL the page is served from; selects the page context
    #[arg(long)]
    pub url: Url,

    /// Dataset JSON file, or a dataset directory / manifest URL to sync from
    #[arg(long)]
    pub dataset: String,

    /// Viewport size as WxH
    #[arg(long, value_parser = parse_viewport, default_value = "1280x800")]
    pub viewport: (f64, f64),

    /// How long the engine runs before the report is taken
    #[arg(long, default_value_t = 1_000)]
    pub settle_ms: u64,

    /// Also print the engine counters
    #[arg(long)]
    pub counters: bool,
}

/// Parse a `WxH` viewport size.
///
/// # Errors
/// Fails unless both sides are positive numbers.
pub fn parse_viewport(value: &str) -> Result<(f64, f64), String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got {value:?}"))?;
    let parse = |side: &str| {
        side.trim()
            .parse::<f64>()
            .ok()
            .filter(|size| size.is_finite() && *size > 0.0)
            .ok_or_else(|| format!("invalid viewport size {value:?}"))
    };
    Ok((parse(width)?, parse(height)?))
}

/// One overlay in the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayReport {
    pub card_id: u32,
    #[serde(flatten)]
    pub stats: CardStats,
    pub layout: Option<OverlayLayout>,
}

/// What one run produced.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub context: &'static str,
    pub overlays: Vec<OverlayReport>,
    pub counters: EngineCounters,
}

/// Give every card element, and every distinct overlay target, a slot on a grid that fills
/// the viewport width. Returns the number of cards laid out.
pub fn lay_out(doc: &mut Document, table: &DescriptorTable, viewport_width: f64) -> usize {
    let columns = ((viewport_width / (CARD_WIDTH + GAP)).floor() as usize).max(1);
    let mut cards: Vec<NodeId> = Vec::new();
    for (_, descriptor) in table.iter() {
        for node in doc.query_selector_all(doc.root(), &descriptor.match_pattern) {
            if !cards.contains(&node) {
                cards.push(node);
            }
        }
    }
    for (index, &card) in cards.iter().enumerate() {
        let column = (index % columns) as f64;
        let row = (index / columns) as f64;
        let rect = Rect::new(
            column * (CARD_WIDTH + GAP),
            row * (CARD_HEIGHT + GAP),
            CARD_WIDTH,
            CARD_HEIGHT,
        );
        doc.set_rect(card, rect);
        if let Some(target) = table
            .match_node(doc, card)
            .and_then(|index| table.get(index))
            .and_then(|descriptor| descriptor.target(doc, card))
            .filter(|target| *target != card)
        {
            doc.set_rect(target, rect);
        }
    }
    cards.len()
}

fn load_page(args: &Args) -> Result<SharedDocument, Error> {
    let html = fs::read_to_string(&args.page)
        .with_context(|| format!("reading page fixture {}", args.page.display()))?;
    let mut doc = parse_document(&html, args.url.clone())
        .with_context(|| format!("parsing page fixture {}", args.page.display()))?;
    let (width, height) = args.viewport;
    doc.set_viewport_size(width, height);
    let cards = lay_out(&mut doc, &DescriptorTable::builtin(), width);
    info!("laid out {cards} card elements");
    Ok(doc.into_shared())
}

async fn load_store(location: &str) -> Result<Rc<DatasetStore>, Error> {
    let path = Path::new(location);
    if path.is_file() {
        let bytes = fs::read(path).with_context(|| format!("reading dataset {location}"))?;
        let dataset = Dataset::from_json(&bytes).with_context(|| format!("loading {location}"))?;
        return Ok(Rc::new(DatasetStore::from_dataset(&dataset)));
    }
    let store = Rc::new(DatasetStore::new());
    store.mark_ready();
    let source = source_for(location)?;
    let sync = DatasetSync::new(source, Rc::clone(&store), SyncConfig::from_env().cache_path);
    if let Err(err) = sync.load_cached().await {
        warn!("ignoring unreadable dataset cache: {err}");
    }
    sync.sync_once()
        .await
        .with_context(|| format!("syncing dataset from {location}"))?;
    Ok(store)
}

/// Run the engine inside the current `LocalSet` and collect the report.
///
/// # Errors
/// Fails when the fixture or dataset cannot be loaded, or the engine cannot start.
pub async fn drive(args: &Args) -> Result<Report, Error> {
    let doc = load_page(args)?;
    let store = load_store(&args.dataset).await?;
    let service: Rc<dyn CardDataService> = store;
    let engine = Engine::new(Rc::clone(&doc), service, OverlayConfig::from_env());
    engine.start().await?;
    sleep(Duration::from_millis(args.settle_ms)).await;

    let overlays = engine
        .overlays()
        .into_iter()
        .map(|(_, record)| OverlayReport {
            card_id: record.card_id,
            stats: record.stats,
            layout: record.layout,
        })
        .collect();
    let report = Report {
        context: engine.page_context().as_str(),
        overlays,
        counters: engine.counters(),
    };
    engine.teardown();
    Ok(report)
}

/// Build a single-threaded runtime and [`drive`] the engine on it.
///
/// # Errors
/// See [`drive`].
pub fn run(args: &Args) -> Result<Report, Error> {
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| anyhow!("could not build runtime: {err}"))?;
    LocalSet::new().block_on(&runtime, drive(args))
}
