use std::time::Duration;

/// A poll cycle failed.
///
/// There is no partial result: the caller of a fetcher is expected to stop, so that
/// the exposed metrics are never a mix of two cycles.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to list the running instances in {region}")]
    Instances {
        region: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to list the active reserved instances in {region}")]
    Reservations {
        region: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to list the active spot requests in {region}")]
    SpotRequests {
        region: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to get the spot price history in {region}")]
    SpotPriceHistory {
        region: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("the {fetcher} fetcher did not finish within {timeout:?}")]
    Timeout { fetcher: &'static str, timeout: Duration },
    #[error("the {fetcher} fetcher panicked")]
    TaskPanicked {
        fetcher: &'static str,
        #[source]
        source: tokio::task::JoinError,
    },
}
