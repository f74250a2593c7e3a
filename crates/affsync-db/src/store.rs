//! Postgres-backed implementations of the persistence traits.

use affsync_core::{
    Brand, BrandStore, CanonicalProduct, FeedSource, IngestionRun, ProductStore, RawSnapshot,
    RunStore, StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{brands, products, runs, DbError};

/// Persistence over a shared connection pool. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn not_found(entity: &'static str, id: impl ToString) -> impl FnOnce(DbError) -> StoreError {
    move |err| match err {
        DbError::NotFound => StoreError::NotFound {
            entity,
            id: id.to_string(),
        },
        other => other.into(),
    }
}

#[async_trait]
impl BrandStore for PgStore {
    async fn get_brand_by_slug(&self, slug: &str) -> Result<Option<Brand>, StoreError> {
        let row = brands::get_brand_by_slug(&self.pool, slug).await?;
        Ok(row.map(Brand::try_from).transpose()?)
    }

    async fn list_brands(&self) -> Result<Vec<Brand>, StoreError> {
        let rows = brands::list_brands(&self.pool).await?;
        let brands = rows
            .into_iter()
            .map(Brand::try_from)
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(brands)
    }

    async fn touch_last_synced(
        &self,
        brand_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        brands::touch_last_synced(&self.pool, brand_id, at)
            .await
            .map_err(not_found("brand", brand_id))
    }
}

#[async_trait]
impl RunStore for PgStore {
    async fn create_run(&self, run: &IngestionRun) -> Result<(), StoreError> {
        Ok(runs::insert_run(&self.pool, run).await?)
    }

    async fn update_run(&self, run: &IngestionRun) -> Result<(), StoreError> {
        runs::update_run(&self.pool, run)
            .await
            .map_err(not_found("ingestion run", run.id))
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<IngestionRun>, StoreError> {
        Ok(runs::get_run(&self.pool, id).await?)
    }

    async fn list_runs_for_brand(
        &self,
        brand_id: Uuid,
        limit: u32,
    ) -> Result<Vec<IngestionRun>, StoreError> {
        Ok(runs::list_runs_for_brand(&self.pool, brand_id, i64::from(limit)).await?)
    }
}

#[async_trait]
impl ProductStore for PgStore {
    async fn insert_product(&self, product: &CanonicalProduct) -> Result<(), StoreError> {
        Ok(products::insert_product(&self.pool, product).await?)
    }

    async fn save_product(&self, product: &CanonicalProduct) -> Result<(), StoreError> {
        products::save_product(&self.pool, product)
            .await
            .map_err(not_found("product", product.id))
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<CanonicalProduct>, StoreError> {
        Ok(products::get_product(&self.pool, id).await?)
    }

    async fn find_by_source(
        &self,
        brand_id: Uuid,
        source: FeedSource,
        source_record_id: &str,
    ) -> Result<Option<CanonicalProduct>, StoreError> {
        Ok(products::find_by_source(&self.pool, brand_id, source, source_record_id).await?)
    }

    async fn list_products_for_brand(
        &self,
        brand_id: Uuid,
    ) -> Result<Vec<CanonicalProduct>, StoreError> {
        Ok(products::list_products_for_brand(&self.pool, brand_id).await?)
    }

    async fn find_by_downstream_id(
        &self,
        downstream_id: i64,
    ) -> Result<Vec<CanonicalProduct>, StoreError> {
        Ok(products::find_by_downstream_id(&self.pool, downstream_id).await?)
    }

    async fn soft_delete_by_downstream_id(
        &self,
        downstream_id: i64,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        Ok(products::soft_delete_by_downstream_id(&self.pool, downstream_id, at).await?)
    }

    async fn refresh_title_by_downstream_id(
        &self,
        downstream_id: i64,
        title: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        Ok(products::refresh_title_by_downstream_id(&self.pool, downstream_id, title, at).await?)
    }

    async fn save_raw_snapshot(&self, snapshot: &RawSnapshot) -> Result<(), StoreError> {
        Ok(products::save_raw_snapshot(&self.pool, snapshot).await?)
    }

    async fn get_raw_snapshot(
        &self,
        product_id: Uuid,
    ) -> Result<Option<RawSnapshot>, StoreError> {
        Ok(products::get_raw_snapshot(&self.pool, product_id).await?)
    }
}
