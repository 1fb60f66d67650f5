//! Version-checked dataset sync: check the manifest, download, validate, persist, replace.

use crate::error::DatasetError;
use crate::model::{Dataset, Manifest};
use crate::store::DatasetStore;
use core::time::Duration;
use futures::FutureExt as _;
use futures::future::LocalBoxFuture;
use log::{debug, info, warn};
use std::env;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tokio::fs;
use tokio::time::{MissedTickBehavior, interval};
use url::Url;

/// File name of the manifest inside a dataset directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Where datasets come from.
pub trait DatasetSource {
    /// Fetch the current manifest.
    fn manifest(&self) -> LocalBoxFuture<'_, Result<Manifest, DatasetError>>;

    /// Download the dataset document announced by `manifest`.
    fn fetch<'a>(&'a self, manifest: &'a Manifest) -> LocalBoxFuture<'a, Result<Vec<u8>, DatasetError>>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

impl<T: DatasetSource + ?Sized> DatasetSource for Box<T> {
    fn manifest(&self) -> LocalBoxFuture<'_, Result<Manifest, DatasetError>> {
        (**self).manifest()
    }

    fn fetch<'a>(&'a self, manifest: &'a Manifest) -> LocalBoxFuture<'a, Result<Vec<u8>, DatasetError>> {
        (**self).fetch(manifest)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

async fn read_file(path: &Path) -> Result<Vec<u8>, DatasetError> {
    fs::read(path)
        .await
        .map_err(|err| DatasetError::io(path, err))
}

/// A directory holding `manifest.json` and the dataset documents it names.
#[derive(Debug, Clone)]
pub struct FileSource {
    dir: PathBuf,
}

impl FileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DatasetSource for FileSource {
    fn manifest(&self) -> LocalBoxFuture<'_, Result<Manifest, DatasetError>> {
        async move {
            let bytes = read_file(&self.dir.join(MANIFEST_FILE)).await?;
            Ok(serde_json::from_slice(&bytes)?)
        }
        .boxed_local()
    }

    fn fetch<'a>(&'a self, manifest: &'a Manifest) -> LocalBoxFuture<'a, Result<Vec<u8>, DatasetError>> {
        async move { read_file(&self.dir.join(&manifest.url)).await }.boxed_local()
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

/// A manifest URL served over HTTP(S); dataset URLs resolve against it.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    manifest_url: Url,
}

impl HttpSource {
    pub fn new(manifest_url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            manifest_url,
        }
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response, DatasetError> {
        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(DatasetError::Status {
                url,
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }
}

impl DatasetSource for HttpSource {
    fn manifest(&self) -> LocalBoxFuture<'_, Result<Manifest, DatasetError>> {
        async move {
            let response = self.get(self.manifest_url.clone()).await?;
            Ok(response.json::<Manifest>().await?)
        }
        .boxed_local()
    }

    fn fetch<'a>(&'a self, manifest: &'a Manifest) -> LocalBoxFuture<'a, Result<Vec<u8>, DatasetError>> {
        async move {
            let url = self
                .manifest_url
                .join(&manifest.url)
                .map_err(|err| DatasetError::Location(format!("{}: {err}", manifest.url)))?;
            let response = self.get(url).await?;
            Ok(response.bytes().await?.to_vec())
        }
        .boxed_local()
    }

    fn describe(&self) -> String {
        self.manifest_url.to_string()
    }
}

/// Pick a source for a location: `http(s)://` manifest URLs, `file://` URLs or plain
/// directory paths.
///
/// # Errors
/// Fails on URL schemes other than `http`, `https` and `file`.
pub fn source_for(location: &str) -> Result<Box<dyn DatasetSource>, DatasetError> {
    let Ok(url) = Url::parse(location) else {
        return Ok(Box::new(FileSource::new(location)));
    };
    match url.scheme() {
        "http" | "https" => Ok(Box::new(HttpSource::new(url))),
        "file" => {
            let path = url
                .to_file_path()
                .map_err(|()| DatasetError::Location(format!("invalid file url {url}")))?;
            Ok(Box::new(FileSource::new(path)))
        }
        other => Err(DatasetError::Location(format!("unsupported scheme {other}"))),
    }
}

/// Sync settings.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Dataset location, see [`source_for`]
    pub source: String,
    /// Where the last good dataset is persisted
    pub cache_path: Option<PathBuf>,
    /// Interval between manifest checks
    pub interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source: String::new(),
            cache_path: None,
            interval: Duration::from_secs(60 * 60),
        }
    }
}

impl SyncConfig {
    /// Load sync settings from the environment.
    ///
    /// Reads `CARDLENS_DATASET_SOURCE`, `CARDLENS_DATASET_CACHE` and
    /// `CARDLENS_SYNC_INTERVAL_SECS` (default: 3600).
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            source: env::var("CARDLENS_DATASET_SOURCE").unwrap_or(defaults.source),
            cache_path: env::var_os("CARDLENS_DATASET_CACHE")
                .map(PathBuf::from)
                .or(defaults.cache_path),
            interval: env::var("CARDLENS_SYNC_INTERVAL_SECS")
                .ok()
                .and_then(|val| val.trim().parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map_or(defaults.interval, Duration::from_secs),
        }
    }
}

/// Result of one sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A newer dataset was installed.
    Updated { version: u64 },
    /// The store already holds the announced version or a newer one.
    UpToDate { version: u64 },
}

/// Keeps a [`DatasetStore`] in step with a [`DatasetSource`].
pub struct DatasetSync<S> {
    source: S,
    store: Rc<DatasetStore>,
    cache_path: Option<PathBuf>,
}

impl<S: DatasetSource> DatasetSync<S> {
    pub const fn new(source: S, store: Rc<DatasetStore>, cache_path: Option<PathBuf>) -> Self {
        Self {
            source,
            store,
            cache_path,
        }
    }

    pub const fn store(&self) -> &Rc<DatasetStore> {
        &self.store
    }

    /// Restore the persisted dataset, if there is one.
    ///
    /// # Errors
    /// Fails when the cache file exists but cannot be read or parsed.
    pub async fn load_cached(&self) -> Result<Option<u64>, DatasetError> {
        let Some(path) = &self.cache_path else {
            return Ok(None);
        };
        if !fs::try_exists(path)
            .await
            .map_err(|err| DatasetError::io(path, err))?
        {
            debug!("no cached dataset at {}", path.display());
            return Ok(None);
        }
        let dataset = Dataset::from_json(&read_file(path).await?)?;
        self.store.replace(&dataset);
        info!("restored cached dataset v{} from {}", dataset.version, path.display());
        Ok(Some(dataset.version))
    }

    /// Check the manifest and install the announced dataset when it is newer.
    ///
    /// # Errors
    /// Fails when the source is unreachable, the dataset is malformed, its version differs
    /// from the manifest, or it cannot be persisted. The store is left untouched on failure.
    pub async fn sync_once(&self) -> Result<SyncOutcome, DatasetError> {
        let manifest = self.source.manifest().await?;
        if let Some(current) = self.store.version()
            && current >= manifest.version
        {
            debug!("dataset v{current} is current (manifest v{})", manifest.version);
            return Ok(SyncOutcome::UpToDate { version: current });
        }
        let bytes = self.source.fetch(&manifest).await?;
        let dataset = Dataset::from_json(&bytes)?;
        if dataset.version != manifest.version {
            return Err(DatasetError::VersionMismatch {
                expected: manifest.version,
                found: dataset.version,
            });
        }
        if let Some(path) = &self.cache_path {
            persist(path, &bytes).await?;
        }
        self.store.replace(&dataset);
        Ok(SyncOutcome::Updated {
            version: dataset.version,
        })
    }

    /// Sync now and then every `period`, forever. Failures are logged and retried on the next
    /// tick.
    pub async fn run(&self, period: Duration) {
        let mut ticks = interval(period.max(Duration::from_secs(1)));
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            match self.sync_once().await {
                Ok(SyncOutcome::Updated { version }) => {
                    info!("synced dataset v{version} from {}", self.source.describe());
                }
                Ok(SyncOutcome::UpToDate { .. }) => {}
                Err(err) => warn!("dataset sync from {} failed: {err}", self.source.describe()),
            }
        }
    }
}

/// Write `bytes` next to `path` and rename over it, so readers never see a partial file.
async fn persist(path: &Path, bytes: &[u8]) -> Result<(), DatasetError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|err| DatasetError::io(parent, err))?;
    }
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);
    fs::write(&staging, bytes)
        .await
        .map_err(|err| DatasetError::io(&staging, err))?;
    fs::rename(&staging, path)
        .await
        .map_err(|err| DatasetError::io(path, err))?;
    debug!("persisted dataset to {}", path.display());
    Ok(())
}
