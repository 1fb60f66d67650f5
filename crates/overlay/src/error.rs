/// Failures reported by the card data service.
///
/// Cloneable so that one failed lookup can be shared by every caller awaiting it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("card data service is not ready")]
    NotReady,
    #[error("card data service is unreachable: {0}")]
    Unavailable(String),
    #[error("card data lookup failed: {0}")]
    Lookup(String),
}

/// Initialization failures of the engine. Retried by the outer run loop.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("could not connect to the card data service after {attempts} attempts: {source}")]
    Connect {
        attempts: u32,
        #[source]
        source: ServiceError,
    },
    #[error("the engine was torn down")]
    TornDown,
}
