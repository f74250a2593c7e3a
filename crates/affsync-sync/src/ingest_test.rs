//! Pipeline tests: whole runs against a static feed, the in-memory stores,
//! and the in-memory catalog.

use std::time::Duration;

use affsync_core::RunStatus;
use tokio::sync::Notify;

use super::*;
use crate::machine::SyncSettings;
use crate::memory::{MemoryCatalog, MemoryStore};
use crate::test_support::{brand, cj_record, StaticConnector};

struct Harness {
    store: Arc<MemoryStore>,
    catalog: Arc<MemoryCatalog>,
    connector: Arc<StaticConnector>,
    pipeline: IngestionPipeline,
}

async fn harness(connector: StaticConnector) -> Harness {
    let store = Arc::new(MemoryStore::new());
    store.upsert_brand(brand()).await;
    let catalog = Arc::new(MemoryCatalog::new());
    let connector = Arc::new(connector);
    let machine = SyncStateMachine::new(catalog.clone(), store.clone(), SyncSettings::default());
    let pipeline = IngestionPipeline::new(
        store.clone(),
        store.clone(),
        store.clone(),
        machine,
        vec![connector.clone() as Arc<dyn FeedConnector>],
        4,
    );
    Harness {
        store,
        catalog,
        connector,
        pipeline,
    }
}

fn boots() -> Vec<RawRecord> {
    vec![
        cj_record("1", "Blue Hiking Boot", "129.99"),
        cj_record("2", "Red Trail Runner", "89.50"),
        cj_record("3", "Free Sample Sock", "0"),
    ]
}

async fn wait_for_terminal(store: &MemoryStore, run_id: Uuid) -> IngestionRun {
    for _ in 0..200 {
        let run = store.get_run(run_id).await.unwrap().expect("run recorded");
        if run.is_terminal() {
            return run;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run {run_id} did not finish");
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_imports_valid_products_and_counts_skips() {
    let h = harness(StaticConnector::new(boots())).await;

    let run = h
        .pipeline
        .run_to_completion("trail-co", RunRequest::default())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.counts.found, 3);
    assert_eq!(run.counts.imported, 2);
    assert_eq!(run.counts.skipped_invalid_price, 1);
    assert_eq!(run.counts.failed, 0);
    assert_eq!(h.catalog.product_count().await, 2);

    let products = h.store.all_products().await;
    assert_eq!(products.len(), 2);
    for p in &products {
        assert_eq!(p.status, ProductStatus::Imported);
        assert!(p.downstream_id.is_some());
        let snapshot = h.store.get_raw_snapshot(p.id).await.unwrap();
        assert!(snapshot.is_some(), "raw record kept for {}", p.sku);
    }

    let stored_run = h.store.get_run(run.id).await.unwrap().unwrap();
    assert_eq!(stored_run, run);
    let brand = h.store.get_brand_by_slug("trail-co").await.unwrap().unwrap();
    assert!(brand.last_synced_at.is_some());
}

#[tokio::test]
async fn rerun_distinguishes_updates_from_no_changes() {
    let h = harness(StaticConnector::new(boots())).await;
    h.pipeline
        .run_to_completion("trail-co", RunRequest::default())
        .await
        .unwrap();

    h.connector.set_records(vec![
        cj_record("1", "Blue Hiking Boot", "99.00"),
        cj_record("2", "Red Trail Runner", "89.50"),
    ]);
    let run = h
        .pipeline
        .run_to_completion("trail-co", RunRequest::default())
        .await
        .unwrap();

    assert_eq!(run.counts.updated, 1);
    assert_eq!(run.counts.no_changes, 1);
    assert_eq!(run.counts.imported, 0);
    assert_eq!(h.catalog.product_count().await, 2);
}

#[tokio::test]
async fn keywords_filter_the_run() {
    let h = harness(StaticConnector::new(boots())).await;

    let run = h
        .pipeline
        .run_to_completion(
            "trail-co",
            RunRequest {
                keywords: Some(vec!["boot".to_string()]),
                ..RunRequest::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(run.filter.keywords, vec!["boot".to_string()]);
    assert_eq!(run.counts.imported, 1);
    assert_eq!(run.counts.skipped_keyword, 2);
    let products = h.store.all_products().await;
    assert_eq!(products[0].keywords_matched, vec!["boot".to_string()]);
}

#[tokio::test]
async fn feed_failure_fails_the_run() {
    let h = harness(StaticConnector::failing()).await;

    let run = h
        .pipeline
        .run_to_completion("trail-co", RunRequest::default())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert!(
        run.error_message
            .as_deref()
            .is_some_and(|m| m.contains("credentials")),
        "unexpected message: {:?}",
        run.error_message
    );
    let brand = h.store.get_brand_by_slug("trail-co").await.unwrap().unwrap();
    assert!(brand.last_synced_at.is_none());
}

#[tokio::test]
async fn downstream_failures_are_counted_not_fatal() {
    let h = harness(StaticConnector::new(boots())).await;
    h.catalog.set_unavailable(true);

    let run = h
        .pipeline
        .run_to_completion("trail-co", RunRequest::default())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.counts.failed, 2);
    for p in h.store.all_products().await {
        assert_eq!(p.status, ProductStatus::Failed);
    }
}

#[tokio::test]
async fn second_run_for_same_brand_is_refused_while_first_runs() {
    let gate = Arc::new(Notify::new());
    let h = harness(StaticConnector::gated(boots(), gate.clone())).await;

    let first = h
        .pipeline
        .start_run("trail-co", RunRequest::default())
        .await
        .unwrap();
    assert_eq!(first.status, RunStatus::Running);
    assert!(h.pipeline.is_running(brand().id));

    let second = h
        .pipeline
        .start_run("trail-co", RunRequest::default())
        .await;
    assert!(
        matches!(second, Err(IngestError::RunInProgress(ref slug)) if slug == "trail-co"),
        "expected RunInProgress, got: {second:?}"
    );

    gate.notify_one();
    let finished = wait_for_terminal(&h.store, first.id).await;
    assert_eq!(finished.status, RunStatus::Completed);

    for _ in 0..100 {
        if !h.pipeline.is_running(brand().id) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    gate.notify_one();
    let third = h
        .pipeline
        .start_run("trail-co", RunRequest::default())
        .await;
    assert!(third.is_ok(), "lock must be released: {third:?}");
}

#[tokio::test]
async fn unknown_brand_and_missing_connector_are_rejected() {
    let h = harness(StaticConnector::new(Vec::new())).await;
    let result = h
        .pipeline
        .run_to_completion("nope", RunRequest::default())
        .await;
    assert!(matches!(result, Err(IngestError::BrandNotFound(_))));

    let store = Arc::new(MemoryStore::new());
    store.upsert_brand(brand()).await;
    let machine = SyncStateMachine::new(
        Arc::new(MemoryCatalog::new()),
        store.clone(),
        SyncSettings::default(),
    );
    let bare = IngestionPipeline::new(store.clone(), store.clone(), store, machine, Vec::new(), 1);
    let result = bare.start_run("trail-co", RunRequest::default()).await;
    assert!(
        matches!(result, Err(IngestError::ConnectorUnavailable(FeedSource::Cj))),
        "expected ConnectorUnavailable, got: {result:?}"
    );
}

// ---------------------------------------------------------------------------
// Reconcile and refresh
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reconcile_soft_deletes_products_removed_downstream() {
    let h = harness(StaticConnector::new(boots())).await;
    h.pipeline
        .run_to_completion("trail-co", RunRequest::default())
        .await
        .unwrap();
    let victim = h.store.all_products().await.remove(0);
    h.catalog.remove(victim.downstream_id.unwrap()).await;

    let summary = h.pipeline.reconcile_brand("trail-co").await.unwrap();

    assert_eq!(summary.checked, 2);
    assert_eq!(summary.present, 1);
    assert_eq!(summary.soft_deleted, 1);
    let reverted = h.store.get_product(victim.id).await.unwrap().unwrap();
    assert_eq!(reverted.status, ProductStatus::Pending);
    assert!(reverted.downstream_id.is_none());

    // The next run re-imports it.
    let run = h
        .pipeline
        .run_to_completion("trail-co", RunRequest::default())
        .await
        .unwrap();
    assert_eq!(run.counts.imported, 1);
    assert_eq!(run.counts.no_changes, 1);
}

#[tokio::test]
async fn reconcile_all_covers_every_brand() {
    let h = harness(StaticConnector::new(boots())).await;
    h.pipeline
        .run_to_completion("trail-co", RunRequest::default())
        .await
        .unwrap();

    let results = h.pipeline.reconcile_all().await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, "trail-co");
    assert_eq!(results[0].1.present, 2);
}

#[tokio::test]
async fn refresh_product_matches_and_updates() {
    let h = harness(StaticConnector::new(boots())).await;
    h.pipeline
        .run_to_completion("trail-co", RunRequest::default())
        .await
        .unwrap();
    let boot = h
        .store
        .all_products()
        .await
        .into_iter()
        .find(|p| p.source_record_id == "1")
        .unwrap();

    h.connector
        .set_records(vec![cj_record("1", "Blue Hiking Boot", "119.99")]);
    let outcome = h.pipeline.refresh_product(boot.id).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::Updated);
    let refreshed = h.store.get_product(boot.id).await.unwrap().unwrap();
    assert_eq!(refreshed.price, rust_decimal::Decimal::new(11_999, 2));

    h.connector
        .set_records(vec![cj_record("77", "Garden Hose", "5")]);
    let result = h.pipeline.refresh_product(boot.id).await;
    assert!(
        matches!(result, Err(IngestError::NoMatch(_))),
        "expected NoMatch, got: {result:?}"
    );
}

#[tokio::test]
async fn refresh_product_follows_the_stored_snapshot_id() {
    let h = harness(StaticConnector::new(boots())).await;
    h.pipeline
        .run_to_completion("trail-co", RunRequest::default())
        .await
        .unwrap();
    let mut boot = h
        .store
        .all_products()
        .await
        .into_iter()
        .find(|p| p.source_record_id == "1")
        .unwrap();
    boot.source_record_id = "legacy-1".to_string();
    boot.title = "Discontinued Label".to_string();
    h.store.save_product(&boot).await.unwrap();

    h.connector.set_records(vec![
        cj_record("2", "Red Trail Runner", "89.50"),
        cj_record("1", "Blue Hiking Boot", "119.99"),
    ]);
    let outcome = h.pipeline.refresh_product(boot.id).await.unwrap();

    assert_eq!(outcome, UpdateOutcome::Updated);
    let refreshed = h.store.get_product(boot.id).await.unwrap().unwrap();
    assert_eq!(refreshed.title, "Blue Hiking Boot");
    assert_eq!(refreshed.price, rust_decimal::Decimal::new(11_999, 2));
}

#[tokio::test]
async fn refresh_product_falls_back_to_snapshot_when_feed_is_empty() {
    let h = harness(StaticConnector::new(boots())).await;
    h.pipeline
        .run_to_completion("trail-co", RunRequest::default())
        .await
        .unwrap();
    let boot = h
        .store
        .all_products()
        .await
        .into_iter()
        .find(|p| p.source_record_id == "1")
        .unwrap();

    h.connector.set_records(Vec::new());
    let outcome = h.pipeline.refresh_product(boot.id).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::NoChanges);

    let other = Uuid::new_v4();
    let result = h.pipeline.refresh_product(other).await;
    assert!(matches!(result, Err(IngestError::ProductNotFound(_))), "{result:?}");
}

#[tokio::test]
async fn publish_product_activates_downstream() {
    let h = harness(StaticConnector::new(boots())).await;
    h.pipeline
        .run_to_completion("trail-co", RunRequest::default())
        .await
        .unwrap();
    let p = h.store.all_products().await.remove(0);

    let outcome = h.pipeline.publish_product(p.id, true).await.unwrap();

    assert_eq!(
        outcome,
        PublishOutcome::Published(affsync_core::CatalogStatus::Active)
    );
    let missing = h.pipeline.publish_product(Uuid::new_v4(), true).await;
    assert!(matches!(missing, Err(IngestError::ProductNotFound(_))));
}

#[test]
fn only_credentialed_feeds_get_connectors() {
    let config = affsync_core::load_app_config_with(|key| match key {
        "DATABASE_URL" => Ok("postgres://localhost/affsync".to_string()),
        "CJ_API_TOKEN" => Ok("token".to_string()),
        "CJ_COMPANY_ID" => Ok("1234567".to_string()),
        _ => Err(std::env::VarError::NotPresent),
    })
    .unwrap();

    let connectors = configured_connectors(&config).unwrap();

    let feeds: Vec<FeedSource> = connectors.iter().map(|c| c.feed()).collect();
    assert_eq!(feeds, vec![FeedSource::Cj]);
}
