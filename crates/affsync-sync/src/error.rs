use affsync_core::{CatalogError, CoreError, StoreError};
use affsync_feeds::{FeedError, SkipReason};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("product {sku} has no downstream resource")]
    NotImported { sku: String },
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("brand {0} not found")]
    BrandNotFound(String),

    #[error("product {0} not found")]
    ProductNotFound(String),

    #[error("an ingestion run is already in progress for brand {0}")]
    RunInProgress(String),

    #[error("no {0} connector is configured")]
    ConnectorUnavailable(affsync_core::FeedSource),

    #[error("no feed record matches product {0}")]
    NoMatch(String),

    #[error("matched feed record was rejected: {0}")]
    RecordRejected(SkipReason),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum WebhookError {
    /// Signature missing, malformed, or wrong, or no secret configured.
    #[error("webhook rejected: {0}")]
    Unauthorized(&'static str),
}
