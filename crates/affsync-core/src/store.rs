//! Persistence collaborators consumed by the sync layer.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::products::{CanonicalProduct, FeedSource};
use crate::runs::IngestionRun;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brand {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub feed: FeedSource,
    pub feed_account_id: String,
    pub default_keywords: Vec<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// The feed's original record for a product, kept for later re-matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSnapshot {
    pub product_id: Uuid,
    pub source_feed: FeedSource,
    pub payload: serde_json::Value,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait BrandStore: Send + Sync {
    async fn get_brand_by_slug(&self, slug: &str) -> Result<Option<Brand>, StoreError>;

    async fn list_brands(&self) -> Result<Vec<Brand>, StoreError>;

    async fn touch_last_synced(&self, brand_id: Uuid, at: DateTime<Utc>)
        -> Result<(), StoreError>;
}

#[async_trait]
pub trait RunStore: Send + Sync {
    async fn create_run(&self, run: &IngestionRun) -> Result<(), StoreError>;

    async fn update_run(&self, run: &IngestionRun) -> Result<(), StoreError>;

    async fn get_run(&self, id: Uuid) -> Result<Option<IngestionRun>, StoreError>;

    /// Most recent runs of a brand, newest first.
    async fn list_runs_for_brand(
        &self,
        brand_id: Uuid,
        limit: u32,
    ) -> Result<Vec<IngestionRun>, StoreError>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn insert_product(&self, product: &CanonicalProduct) -> Result<(), StoreError>;

    /// Overwrite every column of an existing product, keyed by `product.id`.
    async fn save_product(&self, product: &CanonicalProduct) -> Result<(), StoreError>;

    async fn get_product(&self, id: Uuid) -> Result<Option<CanonicalProduct>, StoreError>;

    async fn find_by_source(
        &self,
        brand_id: Uuid,
        source: FeedSource,
        source_record_id: &str,
    ) -> Result<Option<CanonicalProduct>, StoreError>;

    async fn list_products_for_brand(
        &self,
        brand_id: Uuid,
    ) -> Result<Vec<CanonicalProduct>, StoreError>;

    async fn find_by_downstream_id(
        &self,
        downstream_id: i64,
    ) -> Result<Vec<CanonicalProduct>, StoreError>;

    /// Demote every product pointing at `downstream_id` to `Pending` and clear
    /// its downstream ids in one atomic write. Returns the number affected.
    async fn soft_delete_by_downstream_id(
        &self,
        downstream_id: i64,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Refresh only the title of products pointing at `downstream_id`.
    async fn refresh_title_by_downstream_id(
        &self,
        downstream_id: i64,
        title: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn save_raw_snapshot(&self, snapshot: &RawSnapshot) -> Result<(), StoreError>;

    async fn get_raw_snapshot(&self, product_id: Uuid)
        -> Result<Option<RawSnapshot>, StoreError>;
}

/// Seen-set for inbound webhook event ids.
///
/// A single process can use the in-memory implementation; horizontally
/// scaled deployments need an implementation backed by a shared store.
#[async_trait]
pub trait EventDedupStore: Send + Sync {
    async fn seen(&self, event_id: &str) -> Result<bool, StoreError>;

    /// Insert `event_id` if absent. Returns `true` when this call inserted it,
    /// `false` when it was already present and unexpired.
    async fn mark_seen(&self, event_id: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Drop expired entries, returning how many were removed.
    async fn evict_expired(&self) -> Result<usize, StoreError>;
}
