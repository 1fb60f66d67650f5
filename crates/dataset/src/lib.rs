//! Card statistics dataset for the overlay engine.
//!
//! [`DatasetStore`] indexes a [`Dataset`] by card id and normalized image URL and serves the
//! engine's lookups through [`overlay::CardDataService`]. [`DatasetSync`] keeps it current:
//! it checks a [`Manifest`], downloads newer datasets from a file or HTTP
//! [`DatasetSource`], persists the last good copy and swaps it into the store, which
//! notifies the engine.

mod error;
pub mod model;
pub mod store;
pub mod sync;

pub use error::DatasetError;
pub use model::{CardRecord, Dataset, Manifest};
pub use store::DatasetStore;
pub use sync::{
    DatasetSource, DatasetSync, FileSource, HttpSource, MANIFEST_FILE, SyncConfig, SyncOutcome,
    source_for,
};
