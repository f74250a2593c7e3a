//! Ingestion runs and reconciliation passes for a brand.
//!
//! A run fetches normalized products through the brand's feed connector and
//! drives each through the [`SyncStateMachine`]. Runs are tracked in the
//! [`RunStore`] and at most one is in flight per brand.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use affsync_core::{
    AppConfig, Brand, BrandStore, CanonicalProduct, FeedSource, IngestionRun, ProductStatus, ProductStore,
    RawSnapshot, RunCounts, RunFilter, RunStore,
};
use affsync_feeds::{
    build_connector, match_record, BrandContext, FeedConnector, FeedError, FeedFilter, Fetched,
    ImageCheckConfig, ImageChecker, Match, MatchTier, RawRecord,
};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IngestError;
use crate::machine::{
    ImportOutcome, InventoryOutcome, PublishOutcome, Reconciled, SyncStateMachine, UpdateOutcome,
};

/// Options for one run. Unset fields take the brand's or the system defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
    #[serde(default)]
    pub max_pages: Option<u32>,
}

impl RunRequest {
    #[must_use]
    pub fn into_filter(self, brand: &Brand) -> RunFilter {
        let defaults = RunFilter::default();
        RunFilter {
            keywords: self
                .keywords
                .unwrap_or_else(|| brand.default_keywords.clone()),
            limit: self.limit.unwrap_or(defaults.limit),
            offset: self.offset.unwrap_or(defaults.offset),
            max_pages: self.max_pages.unwrap_or(defaults.max_pages),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub checked: u32,
    pub present: u32,
    pub soft_deleted: u32,
    pub stock_updated: u32,
    pub failed: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProductOutcome {
    Imported,
    Updated,
    NoChanges,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReconcileOutcome {
    Present { stock_updated: bool },
    SoftDeleted,
    Failed,
}

#[must_use]
pub fn brand_context(brand: &Brand) -> BrandContext {
    BrandContext {
        brand_id: brand.id,
        brand_name: brand.name.clone(),
        brand_slug: brand.slug.clone(),
        account_id: brand.feed_account_id.clone(),
    }
}

/// Build a connector for every feed whose credentials are configured.
/// Feeds without credentials are skipped with a warning; runs for their
/// brands fail with [`IngestError::ConnectorUnavailable`].
///
/// # Errors
///
/// Returns [`FeedError::Http`] if an HTTP client cannot be built.
pub fn configured_connectors(config: &AppConfig) -> Result<Vec<Arc<dyn FeedConnector>>, FeedError> {
    let images = ImageChecker::new(ImageCheckConfig::from_app_config(config))?;
    let mut connectors = Vec::new();
    for feed in [FeedSource::Cj, FeedSource::Pepperjam] {
        match build_connector(feed, config, images.clone()) {
            Ok(connector) => connectors.push(connector),
            Err(FeedError::MissingCredentials { var, .. }) => {
                tracing::warn!(feed = %feed, missing = var, "feed connector not configured");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(connectors)
}

struct Inner {
    brands: Arc<dyn BrandStore>,
    runs: Arc<dyn RunStore>,
    products: Arc<dyn ProductStore>,
    machine: SyncStateMachine,
    connectors: HashMap<FeedSource, Arc<dyn FeedConnector>>,
    max_concurrent: usize,
    in_flight: Mutex<HashSet<Uuid>>,
}

impl Inner {
    fn in_flight(&self) -> std::sync::MutexGuard<'_, HashSet<Uuid>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds a brand's in-flight slot; released on drop.
struct RunGuard {
    inner: Arc<Inner>,
    brand_id: Uuid,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.inner.in_flight().remove(&self.brand_id);
    }
}

#[derive(Clone)]
pub struct IngestionPipeline {
    inner: Arc<Inner>,
}

impl IngestionPipeline {
    #[must_use]
    pub fn new(
        brands: Arc<dyn BrandStore>,
        runs: Arc<dyn RunStore>,
        products: Arc<dyn ProductStore>,
        machine: SyncStateMachine,
        connectors: Vec<Arc<dyn FeedConnector>>,
        max_concurrent: usize,
    ) -> Self {
        let connectors = connectors.into_iter().map(|c| (c.feed(), c)).collect();
        Self {
            inner: Arc::new(Inner {
                brands,
                runs,
                products,
                machine,
                connectors,
                max_concurrent: max_concurrent.max(1),
                in_flight: Mutex::new(HashSet::new()),
            }),
        }
    }

    #[must_use]
    pub fn machine(&self) -> &SyncStateMachine {
        &self.inner.machine
    }

    /// Whether a run for `brand_id` is currently executing.
    #[must_use]
    pub fn is_running(&self, brand_id: Uuid) -> bool {
        self.inner.in_flight().contains(&brand_id)
    }

    /// Record a new run and execute it in the background.
    ///
    /// Returns the run in its `Running` state; poll the run store for the
    /// outcome.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::BrandNotFound`], [`IngestError::ConnectorUnavailable`],
    /// [`IngestError::RunInProgress`], or a store error from recording the run.
    pub async fn start_run(
        &self,
        slug: &str,
        request: RunRequest,
    ) -> Result<IngestionRun, IngestError> {
        let (brand, run, guard) = self.prepare(slug, request).await?;
        let started = run.clone();
        let pipeline = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            pipeline.execute(&brand, run).await;
        });
        Ok(started)
    }

    /// Record a new run and execute it before returning the finished run.
    ///
    /// # Errors
    ///
    /// Same as [`IngestionPipeline::start_run`]. Failures during the run
    /// itself are reported through the run's status, not as an error.
    pub async fn run_to_completion(
        &self,
        slug: &str,
        request: RunRequest,
    ) -> Result<IngestionRun, IngestError> {
        let (brand, run, _guard) = self.prepare(slug, request).await?;
        Ok(self.execute(&brand, run).await)
    }

    async fn prepare(
        &self,
        slug: &str,
        request: RunRequest,
    ) -> Result<(Brand, IngestionRun, RunGuard), IngestError> {
        let brand = self.brand(slug).await?;
        self.connector(brand.feed)?;

        if !self.inner.in_flight().insert(brand.id) {
            return Err(IngestError::RunInProgress(brand.slug));
        }
        let guard = RunGuard {
            inner: Arc::clone(&self.inner),
            brand_id: brand.id,
        };

        let run = IngestionRun::start(brand.id, request.into_filter(&brand));
        self.inner.runs.create_run(&run).await?;
        tracing::info!(
            brand = %brand.slug,
            run_id = %run.id,
            keywords = ?run.filter.keywords,
            limit = run.filter.limit,
            "ingestion run started"
        );
        Ok((brand, run, guard))
    }

    async fn execute(&self, brand: &Brand, mut run: IngestionRun) -> IngestionRun {
        let mut counts = RunCounts::default();
        match self.run_body(brand, &run.filter, &mut counts).await {
            Ok(()) => {
                run.complete(counts);
            }
            Err(e) => {
                tracing::error!(brand = %brand.slug, run_id = %run.id, error = %e, "ingestion run failed");
                run.fail(counts, e.to_string());
            }
        }

        if let Err(e) = self.inner.runs.update_run(&run).await {
            tracing::error!(run_id = %run.id, error = %e, "failed to record run outcome");
        }
        if run.status == affsync_core::RunStatus::Completed {
            if let Err(e) = self.inner.brands.touch_last_synced(brand.id, Utc::now()).await {
                tracing::warn!(brand = %brand.slug, error = %e, "failed to update last sync time");
            }
        }

        tracing::info!(
            brand = %brand.slug,
            run_id = %run.id,
            status = %run.status,
            found = run.counts.found,
            imported = run.counts.imported,
            updated = run.counts.updated,
            no_changes = run.counts.no_changes,
            failed = run.counts.failed,
            skipped = run.counts.skipped(),
            "ingestion run finished"
        );
        run
    }

    async fn run_body(
        &self,
        brand: &Brand,
        filter: &RunFilter,
        counts: &mut RunCounts,
    ) -> Result<(), IngestError> {
        let connector = self.connector(brand.feed)?;
        let feed_filter = FeedFilter {
            account_id: brand.feed_account_id.clone(),
            brand: brand_context(brand),
            keywords: filter.keywords.clone(),
            limit: filter.limit,
            offset: filter.offset,
            max_pages: filter.max_pages,
        };

        let report = connector.fetch_normalized(&feed_filter).await?;
        report.apply_to(counts);

        let outcomes: Vec<ProductOutcome> = stream::iter(
            report
                .products
                .into_iter()
                .map(|fetched| self.process(fetched)),
        )
        .buffer_unordered(self.inner.max_concurrent)
        .collect()
        .await;

        for outcome in outcomes {
            match outcome {
                ProductOutcome::Imported => counts.imported += 1,
                ProductOutcome::Updated => counts.updated += 1,
                ProductOutcome::NoChanges => counts.no_changes += 1,
                ProductOutcome::Failed => counts.failed += 1,
            }
        }
        Ok(())
    }

    async fn process(&self, fetched: Fetched) -> ProductOutcome {
        let sku = fetched.product.sku.clone();
        match self.try_process(fetched).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(sku = %sku, error = %e, "product sync failed");
                ProductOutcome::Failed
            }
        }
    }

    async fn try_process(&self, fetched: Fetched) -> Result<ProductOutcome, IngestError> {
        let Fetched { product: fresh, raw } = fetched;
        let machine = &self.inner.machine;
        let existing = self
            .inner
            .products
            .find_by_source(fresh.brand_id, fresh.source_feed, &fresh.source_record_id)
            .await?;

        let Some(mut stored) = existing else {
            let mut product = fresh;
            if !machine.settings().dry_run {
                self.inner.products.insert_product(&product).await?;
            }
            self.snapshot(&product, &raw).await?;
            machine.import(&mut product).await?;
            return Ok(ProductOutcome::Imported);
        };

        self.snapshot(&stored, &raw).await?;
        if stored.status == ProductStatus::Imported {
            return Ok(match machine.update(&mut stored, &fresh).await? {
                UpdateOutcome::Updated => ProductOutcome::Updated,
                UpdateOutcome::NoChanges => ProductOutcome::NoChanges,
                UpdateOutcome::Recreated => ProductOutcome::Imported,
            });
        }

        stored.apply_refresh(&fresh);
        match machine.import(&mut stored).await? {
            ImportOutcome::Created | ImportOutcome::Updated | ImportOutcome::DryRun => {
                Ok(ProductOutcome::Imported)
            }
            ImportOutcome::AlreadyImported => Ok(ProductOutcome::NoChanges),
        }
    }

    async fn snapshot(&self, product: &CanonicalProduct, raw: &RawRecord) -> Result<(), IngestError> {
        if self.inner.machine.settings().dry_run {
            return Ok(());
        }
        let payload = match raw.to_snapshot() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(sku = %product.sku, error = %e, "raw record not serializable, snapshot skipped");
                return Ok(());
            }
        };
        self.inner
            .products
            .save_raw_snapshot(&RawSnapshot {
                product_id: product.id,
                source_feed: raw.feed(),
                payload,
                captured_at: Utc::now(),
            })
            .await?;
        Ok(())
    }

    /// Verify every tracked product of a brand downstream and bring its stock
    /// in line. Products whose downstream resource is gone revert to pending.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::BrandNotFound`] or a store error listing the
    /// brand's products. Per-product failures are counted, not returned.
    pub async fn reconcile_brand(&self, slug: &str) -> Result<ReconcileSummary, IngestError> {
        let brand = self.brand(slug).await?;
        let tracked: Vec<CanonicalProduct> = self
            .inner
            .products
            .list_products_for_brand(brand.id)
            .await?
            .into_iter()
            .filter(|p| p.downstream_id.is_some())
            .collect();

        let outcomes: Vec<ReconcileOutcome> =
            stream::iter(tracked.into_iter().map(|p| self.reconcile_one(p)))
                .buffer_unordered(self.inner.max_concurrent)
                .collect()
                .await;

        let mut summary = ReconcileSummary::default();
        for outcome in outcomes {
            summary.checked += 1;
            match outcome {
                ReconcileOutcome::Present { stock_updated } => {
                    summary.present += 1;
                    if stock_updated {
                        summary.stock_updated += 1;
                    }
                }
                ReconcileOutcome::SoftDeleted => summary.soft_deleted += 1,
                ReconcileOutcome::Failed => summary.failed += 1,
            }
        }

        tracing::info!(
            brand = %brand.slug,
            checked = summary.checked,
            soft_deleted = summary.soft_deleted,
            stock_updated = summary.stock_updated,
            failed = summary.failed,
            "reconcile pass complete"
        );
        Ok(summary)
    }

    /// Reconcile every brand, logging and skipping brands that fail.
    ///
    /// # Errors
    ///
    /// Returns a store error only if the brand list cannot be loaded.
    pub async fn reconcile_all(&self) -> Result<Vec<(String, ReconcileSummary)>, IngestError> {
        let brands = self.inner.brands.list_brands().await?;
        let mut results = Vec::with_capacity(brands.len());
        for brand in brands {
            match self.reconcile_brand(&brand.slug).await {
                Ok(summary) => results.push((brand.slug, summary)),
                Err(e) => {
                    tracing::error!(brand = %brand.slug, error = %e, "reconcile pass failed");
                }
            }
        }
        Ok(results)
    }

    async fn reconcile_one(&self, mut product: CanonicalProduct) -> ReconcileOutcome {
        let machine = &self.inner.machine;
        match machine.verify_and_reconcile(&mut product).await {
            Ok(Reconciled::SoftDeleted) => ReconcileOutcome::SoftDeleted,
            Ok(Reconciled::Skipped) => ReconcileOutcome::Present {
                stock_updated: false,
            },
            Ok(Reconciled::Present) => match machine.sync_inventory(&mut product).await {
                Ok(InventoryOutcome::SoftDeleted) => ReconcileOutcome::SoftDeleted,
                Ok(InventoryOutcome::Updated { .. }) => ReconcileOutcome::Present {
                    stock_updated: true,
                },
                Ok(InventoryOutcome::Unchanged | InventoryOutcome::Skipped) => {
                    ReconcileOutcome::Present {
                        stock_updated: false,
                    }
                }
                Err(e) => {
                    tracing::warn!(sku = %product.sku, error = %e, "stock sync failed");
                    ReconcileOutcome::Failed
                }
            },
            Err(e) => {
                tracing::warn!(sku = %product.sku, error = %e, "downstream verification failed");
                ReconcileOutcome::Failed
            }
        }
    }

    /// Re-fetch the feed, find the record this product came from, and push
    /// any changed fields downstream.
    ///
    /// The stored raw snapshot's record id is tried first against the fresh
    /// records, then the matcher tiers. When the feed returns nothing the
    /// snapshot itself is the only candidate.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::NoMatch`] when no feed record matches, or
    /// [`IngestError::RecordRejected`] when the match no longer normalizes.
    pub async fn refresh_product(&self, product_id: Uuid) -> Result<UpdateOutcome, IngestError> {
        let mut stored = self.product(product_id).await?;
        let brand = self
            .inner
            .brands
            .list_brands()
            .await?
            .into_iter()
            .find(|b| b.id == stored.brand_id)
            .ok_or_else(|| IngestError::BrandNotFound(stored.brand_id.to_string()))?;
        let connector = self.connector(stored.source_feed)?;
        let context = brand_context(&brand);

        let defaults = RunFilter::default();
        let records = connector
            .fetch_raw(&FeedFilter {
                account_id: brand.feed_account_id.clone(),
                brand: context.clone(),
                keywords: Vec::new(),
                limit: defaults.limit,
                offset: 0,
                max_pages: defaults.max_pages,
            })
            .await?;
        let snapshot = self.stored_record(&stored).await?;

        let by_snapshot = snapshot
            .as_ref()
            .and_then(RawRecord::record_id)
            .and_then(|id| records.iter().find(|r| r.record_id().as_deref() == Some(id.as_str())));
        let found = match by_snapshot {
            Some(record) => Match {
                record,
                tier: MatchTier::ExactId,
            },
            None if records.is_empty() => snapshot
                .as_ref()
                .and_then(|s| match_record(&stored, &brand.name, std::slice::from_ref(s)))
                .ok_or_else(|| IngestError::NoMatch(stored.sku.clone()))?,
            None => match_record(&stored, &brand.name, &records)
                .ok_or_else(|| IngestError::NoMatch(stored.sku.clone()))?,
        };
        tracing::debug!(sku = %stored.sku, tier = ?found.tier, "feed record matched");

        let fresh = connector
            .normalizer()
            .normalize(found.record, &context)
            .await
            .map_err(IngestError::RecordRejected)?;
        self.snapshot(&stored, found.record).await?;

        Ok(self.inner.machine.update(&mut stored, &fresh).await?)
    }

    async fn stored_record(
        &self,
        product: &CanonicalProduct,
    ) -> Result<Option<RawRecord>, IngestError> {
        let Some(snapshot) = self.inner.products.get_raw_snapshot(product.id).await? else {
            return Ok(None);
        };
        match RawRecord::from_snapshot(snapshot.payload) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(sku = %product.sku, error = %e, "stored raw snapshot unreadable");
                Ok(None)
            }
        }
    }

    /// Toggle a product's downstream visibility.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::ProductNotFound`] or the state machine's error.
    pub async fn publish_product(
        &self,
        product_id: Uuid,
        active: bool,
    ) -> Result<PublishOutcome, IngestError> {
        let mut product = self.product(product_id).await?;
        Ok(self.inner.machine.publish(&mut product, active).await?)
    }

    async fn brand(&self, slug: &str) -> Result<Brand, IngestError> {
        self.inner
            .brands
            .get_brand_by_slug(slug)
            .await?
            .ok_or_else(|| IngestError::BrandNotFound(slug.to_string()))
    }

    async fn product(&self, id: Uuid) -> Result<CanonicalProduct, IngestError> {
        self.inner
            .products
            .get_product(id)
            .await?
            .ok_or_else(|| IngestError::ProductNotFound(id.to_string()))
    }

    fn connector(&self, feed: FeedSource) -> Result<Arc<dyn FeedConnector>, IngestError> {
        self.inner
            .connectors
            .get(&feed)
            .cloned()
            .ok_or(IngestError::ConnectorUnavailable(feed))
    }
}

#[cfg(test)]
#[path = "ingest_test.rs"]
mod tests;
