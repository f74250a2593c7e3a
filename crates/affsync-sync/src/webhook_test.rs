//! Unit tests for the webhook pipeline: signature, dedup, freshness, apply.

use affsync_core::{ProductStatus, ProductStore};
use chrono::TimeZone;
use serde_json::json;

use super::*;
use crate::dedup::InMemoryEventCache;
use crate::memory::MemoryStore;
use crate::test_support::product;

const SECRET: &str = "whsec_test";

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn settings() -> WebhookSettings {
    WebhookSettings {
        secret: Some(SECRET.to_string()),
        max_age: Duration::from_secs(86_400),
        dedup_ttl: Duration::from_secs(86_400),
    }
}

fn ingestor(store: Arc<MemoryStore>) -> WebhookIngestor {
    WebhookIngestor::new(settings(), Arc::new(InMemoryEventCache::new()), store)
}

fn delivery(event_id: &str, topic: &str, body: &serde_json::Value) -> InboundWebhook {
    let body = serde_json::to_vec(body).unwrap();
    InboundWebhook {
        event_id: Some(event_id.to_string()),
        topic: Some(topic.to_string()),
        triggered_at: Some("2026-03-01T11:59:00Z".to_string()),
        signature: Some(sign(SECRET, &body)),
        body,
    }
}

/// Two stored products that both point at downstream product 900.
async fn store_with_reimports() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for record_id in ["42", "43"] {
        let mut p = product(record_id, "Blue Hiking Boot");
        p.status = ProductStatus::Imported;
        p.downstream_id = Some(900);
        p.inventory_item_id = Some(9_000);
        store.insert_product(&p).await.unwrap();
    }
    store
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

#[test]
fn signature_round_trip_and_tamper() {
    let body = br#"{"id":900}"#;
    let sig = sign(SECRET, body);
    assert!(verify_signature(SECRET, body, &sig));
    assert!(!verify_signature(SECRET, br#"{"id":901}"#, &sig));
    assert!(!verify_signature("other", body, &sig));
    assert!(!verify_signature(SECRET, body, "not base64 !!"));
}

#[test]
fn known_vector_matches() {
    // HMAC-SHA256("key", "The quick brown fox jumps over the lazy dog"), base64.
    assert_eq!(
        sign("key", b"The quick brown fox jumps over the lazy dog"),
        "97yD9DBThCSxMpjmqm+xQ+9NWaFJRhdZl0edvC0aPNg="
    );
}

#[tokio::test]
async fn bad_signature_is_rejected_and_not_recorded() {
    let store = store_with_reimports().await;
    let cache = Arc::new(InMemoryEventCache::new());
    let ingestor = WebhookIngestor::new(settings(), cache.clone(), store.clone());

    let mut hook = delivery("evt-1", "products/delete", &json!({"id": 900}));
    hook.signature = Some(sign("wrong", &hook.body));

    let result = ingestor.handle(&hook, now()).await;
    assert!(
        matches!(result, Err(WebhookError::Unauthorized(_))),
        "expected Unauthorized, got: {result:?}"
    );
    assert!(cache.is_empty().await, "rejected events must not be marked seen");
    assert_eq!(store.find_by_downstream_id(900).await.unwrap().len(), 2);
}

#[tokio::test]
async fn missing_secret_rejects_everything() {
    let store = Arc::new(MemoryStore::new());
    let ingestor = WebhookIngestor::new(
        WebhookSettings {
            secret: None,
            ..settings()
        },
        Arc::new(InMemoryEventCache::new()),
        store,
    );
    let hook = delivery("evt-1", "products/delete", &json!({"id": 900}));
    assert!(ingestor.handle(&hook, now()).await.is_err());
}

#[tokio::test]
async fn missing_signature_is_rejected() {
    let ingestor = ingestor(Arc::new(MemoryStore::new()));
    let mut hook = delivery("evt-1", "products/delete", &json!({"id": 900}));
    hook.signature = None;
    assert!(ingestor.handle(&hook, now()).await.is_err());
}

// ---------------------------------------------------------------------------
// Apply
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_demotes_every_matching_product_once() {
    let store = store_with_reimports().await;
    let ingestor = ingestor(store.clone());
    let hook = delivery("evt-1", "products/delete", &json!({"id": 900}));

    let first = ingestor.handle(&hook, now()).await.unwrap();
    assert_eq!(first, WebhookOutcome::Applied { affected: 2 });
    assert!(store.find_by_downstream_id(900).await.unwrap().is_empty());
    for p in store.all_products().await {
        assert_eq!(p.status, ProductStatus::Pending);
        assert!(p.inventory_item_id.is_none());
    }

    let second = ingestor.handle(&hook, now()).await.unwrap();
    assert_eq!(second, WebhookOutcome::Duplicate);
}

#[tokio::test]
async fn update_refreshes_title_only() {
    let store = store_with_reimports().await;
    let ingestor = ingestor(store.clone());
    let hook = delivery(
        "evt-2",
        "products/update",
        &json!({"id": 900, "title": "Blue Hiking Boot (2026)", "body_html": "<p>x</p>"}),
    );

    let outcome = ingestor.handle(&hook, now()).await.unwrap();

    assert_eq!(outcome, WebhookOutcome::Applied { affected: 2 });
    for p in store.find_by_downstream_id(900).await.unwrap() {
        assert_eq!(p.title, "Blue Hiking Boot (2026)");
        assert_eq!(p.description, "Waterproof");
        assert_eq!(p.status, ProductStatus::Imported);
    }
}

#[tokio::test]
async fn stale_event_is_acknowledged_without_effect() {
    let store = store_with_reimports().await;
    let ingestor = ingestor(store.clone());
    let mut hook = delivery("evt-3", "products/delete", &json!({"id": 900}));
    hook.triggered_at = Some("2026-02-27T11:00:00Z".to_string());

    assert_eq!(
        ingestor.handle(&hook, now()).await.unwrap(),
        WebhookOutcome::Stale
    );
    assert_eq!(store.find_by_downstream_id(900).await.unwrap().len(), 2);
}

#[tokio::test]
async fn unknown_topic_is_ignored() {
    let ingestor = ingestor(Arc::new(MemoryStore::new()));
    let hook = delivery("evt-4", "orders/create", &json!({"id": 1}));
    assert_eq!(
        ingestor.handle(&hook, now()).await.unwrap(),
        WebhookOutcome::Ignored
    );
}

#[tokio::test]
async fn malformed_body_is_swallowed_as_failed() {
    let ingestor = ingestor(Arc::new(MemoryStore::new()));
    let body = b"not json".to_vec();
    let hook = InboundWebhook {
        event_id: Some("evt-5".to_string()),
        topic: Some("products/delete".to_string()),
        triggered_at: None,
        signature: Some(sign(SECRET, &body)),
        body,
    };
    assert_eq!(
        ingestor.handle(&hook, now()).await.unwrap(),
        WebhookOutcome::Failed
    );
}

#[tokio::test]
async fn delete_for_unknown_resource_affects_nothing() {
    let ingestor = ingestor(Arc::new(MemoryStore::new()));
    let hook = delivery("evt-6", "products/delete", &json!({"id": 12345}));
    assert_eq!(
        ingestor.handle(&hook, now()).await.unwrap(),
        WebhookOutcome::Applied { affected: 0 }
    );
}
