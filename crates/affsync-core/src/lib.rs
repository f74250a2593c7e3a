pub mod app_config;
pub mod brands;
pub mod catalog;
pub mod config;
pub mod products;
pub mod runs;
pub mod store;

pub use app_config::{AppConfig, Environment};
pub use brands::{load_brands, BrandConfig, BrandsFile};
pub use catalog::{CatalogApi, CatalogError, CatalogProduct, CatalogStatus, ProductDraft};
pub use config::{load_app_config, load_app_config_from_env, load_app_config_with};
pub use products::{derive_sku, CanonicalProduct, DownstreamRef, FeedSource, ProductStatus};
pub use runs::{IngestionRun, RunCounts, RunFilter, RunStatus};
pub use store::{
    Brand, BrandStore, EventDedupStore, ProductStore, RawSnapshot, RunStore, StoreError,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read brands file {path}: {source}")]
    BrandsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse brands file: {0}")]
    BrandsFileParse(#[from] serde_yaml::Error),

    #[error("brands validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid feed source: {0}")]
    InvalidFeedSource(String),

    #[error("invalid product status: {0}")]
    InvalidProductStatus(String),

    #[error("invalid run status: {0}")]
    InvalidRunStatus(String),

    #[error("invalid status transition for product {sku}: {from} -> {to}")]
    InvalidTransition {
        sku: String,
        from: ProductStatus,
        to: ProductStatus,
    },
}
