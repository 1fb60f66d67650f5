use std::io;
use std::path::PathBuf;
use url::Url;

/// Failures while loading, validating or syncing a dataset.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed dataset json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} answered with status {status}")]
    Status { url: Url, status: u16 },
    #[error("invalid dataset location: {0}")]
    Location(String),
    #[error("dataset carries version {found}, manifest announced {expected}")]
    VersionMismatch { expected: u64, found: u64 },
    #[error("invalid dataset: {0}")]
    Invalid(String),
}

impl DatasetError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
