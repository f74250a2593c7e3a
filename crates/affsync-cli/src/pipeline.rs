//! Pipeline-backed command handlers.
//!
//! Each handler wires Postgres stores, the Shopify client, and the
//! credentialed feed connectors into an [`IngestionPipeline`].

use std::sync::Arc;

use affsync_core::{AppConfig, BrandStore, RunStore};
use affsync_db::PgStore;
use affsync_shopify::ShopifyAdminClient;
use affsync_sync::{
    configured_connectors, IngestionPipeline, PublishOutcome, RunRequest, SyncSettings,
    SyncStateMachine, UpdateOutcome,
};
use uuid::Uuid;

/// Builds a [`RunRequest`]; an empty keyword list means the brand's defaults.
pub(crate) fn run_request(
    keywords: Vec<String>,
    limit: Option<u32>,
    offset: Option<u32>,
    max_pages: Option<u32>,
) -> RunRequest {
    let keywords: Vec<String> = keywords
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();

    RunRequest {
        keywords: (!keywords.is_empty()).then_some(keywords),
        limit,
        offset,
        max_pages,
    }
}

fn build_pipeline(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    dry_run: bool,
) -> anyhow::Result<IngestionPipeline> {
    let store = Arc::new(PgStore::new(pool.clone()));
    let catalog = Arc::new(
        ShopifyAdminClient::from_app_config(config)
            .map_err(|e| anyhow::anyhow!("failed to build Shopify client: {e}"))?,
    );

    let mut settings = SyncSettings::from_app_config(config);
    settings.dry_run |= dry_run;
    let machine = SyncStateMachine::new(catalog, store.clone(), settings);

    Ok(IngestionPipeline::new(
        store.clone(),
        store.clone(),
        store,
        machine,
        configured_connectors(config)?,
        config.max_concurrent_products,
    ))
}

/// Runs one ingestion for `slug` and prints its counts.
///
/// # Errors
///
/// Returns an error if the pipeline cannot be built or the run cannot start.
/// A run that starts and then fails is reported, not returned.
pub(crate) async fn run_ingest(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    slug: &str,
    request: RunRequest,
    dry_run: bool,
) -> anyhow::Result<()> {
    let pipeline = build_pipeline(pool, config, dry_run)?;
    let run = pipeline.run_to_completion(slug, request).await?;
    let c = run.counts;

    println!("run {} for {slug}: {}", run.id, run.status);
    println!(
        "  found {} | imported {} | updated {} | unchanged {} | failed {}",
        c.found, c.imported, c.updated, c.no_changes, c.failed
    );
    println!(
        "  skipped: keyword {} | missing data {} | invalid price {} | invalid image {}",
        c.skipped_keyword, c.skipped_missing_data, c.skipped_invalid_price, c.skipped_invalid_image
    );
    if let Some(message) = &run.error_message {
        eprintln!("error: {message}");
    }
    if dry_run {
        println!("dry-run: no catalog writes were made");
    }
    Ok(())
}

/// Reconciles one brand, or all brands when `brand_filter` is `None`.
///
/// # Errors
///
/// Returns an error if the brand is unknown or the brand list cannot load.
/// Per-product failures are counted in the summary.
pub(crate) async fn run_reconcile(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    brand_filter: Option<&str>,
) -> anyhow::Result<()> {
    let pipeline = build_pipeline(pool, config, false)?;
    let results = match brand_filter {
        Some(slug) => vec![(slug.to_string(), pipeline.reconcile_brand(slug).await?)],
        None => pipeline.reconcile_all().await?,
    };

    if results.is_empty() {
        println!("no brands to reconcile");
    }
    for (slug, s) in results {
        println!(
            "{slug}: checked {} | present {} | soft-deleted {} | stock updated {} | failed {}",
            s.checked, s.present, s.soft_deleted, s.stock_updated, s.failed
        );
    }
    Ok(())
}

pub(crate) async fn run_refresh(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    product_id: Uuid,
) -> anyhow::Result<()> {
    let pipeline = build_pipeline(pool, config, false)?;
    let outcome = match pipeline.refresh_product(product_id).await? {
        UpdateOutcome::Updated => "updated",
        UpdateOutcome::NoChanges => "no changes",
        UpdateOutcome::Recreated => "recreated downstream",
    };
    println!("product {product_id}: {outcome}");
    Ok(())
}

pub(crate) async fn run_publish(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    product_id: Uuid,
    active: bool,
) -> anyhow::Result<()> {
    let pipeline = build_pipeline(pool, config, false)?;
    match pipeline.publish_product(product_id, active).await? {
        PublishOutcome::Published(status) => {
            println!("product {product_id}: now {}", status.as_str());
        }
        PublishOutcome::SoftDeleted => {
            println!("product {product_id}: missing downstream; reverted to pending");
        }
    }
    Ok(())
}

/// Prints the most recent runs for a brand, newest first.
pub(crate) async fn run_list_runs(
    pool: &sqlx::PgPool,
    slug: &str,
    limit: u32,
) -> anyhow::Result<()> {
    let store = PgStore::new(pool.clone());
    let brand = store
        .get_brand_by_slug(slug)
        .await?
        .ok_or_else(|| anyhow::anyhow!("brand '{slug}' not found"))?;

    let runs = store.list_runs_for_brand(brand.id, limit).await?;
    if runs.is_empty() {
        println!("no runs recorded for {slug}");
        return Ok(());
    }
    for run in runs {
        println!(
            "{} {} {:<9} found {:>4} imported {:>4} updated {:>4} failed {:>4}",
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            run.id,
            run.status.as_str(),
            run.counts.found,
            run.counts.imported,
            run.counts.updated,
            run.counts.failed,
        );
    }
    Ok(())
}
