//! Card statistics overlay engine.
//!
//! The engine attaches to a host [`dom::Document`], finds card elements with a table of
//! [`CardDescriptor`]s, resolves each card to an id and a statistics snapshot through a
//! [`CardDataService`], and places a small overlay next to every visible card. It keeps the
//! overlays consistent while the host page mutates, paginates and swaps its dataset, without
//! ever duplicating an overlay or reacting to its own insertions.

pub mod cache;
pub mod config;
pub mod context;
pub mod descriptor;
mod engine;
pub mod error;
pub mod manager;
pub mod navigation;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod service;
pub mod telemetry;
pub mod watcher;

pub use config::{DEFAULT_MAX_OVERLAYS, OverlayConfig};
pub use context::{LayoutContext, PageContext};
pub use descriptor::{
    CardDescriptor, DescriptorTable, IdExtraction, InsertionMode, InsertionTarget,
    builtin_descriptors,
};
pub use engine::Engine;
pub use error::{InitError, ServiceError};
pub use manager::{OVERLAY_CLASS, OverlayLayout, OverlayRecord, is_in_overlay};
pub use registry::CardState;
pub use service::{
    CardDataService, CardId, CardStats, DatasetUpdated, image_fingerprint, normalize_image_url,
    normalize_image_url_against,
};
pub use telemetry::EngineCounters;
