use thiserror::Error;

/// Errors building a [`crate::ShopifyAdminClient`]. Request failures are
/// reported as [`affsync_core::CatalogError`].
#[derive(Debug, Error)]
pub enum ShopifyError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Shopify client is missing {0}")]
    MissingConfig(&'static str),

    #[error("invalid store URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },
}
