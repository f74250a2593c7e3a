//! Integration tests for `ShopifyAdminClient` against a `wiremock` server.
//!
//! Covers the not-found signal used by reconciliation, SKU lookup over
//! GraphQL, product creation, collection upsert, and inventory calls.

use std::time::Duration;

use rust_decimal::Decimal;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use affsync_core::{CatalogApi, CatalogError, CatalogStatus, ProductDraft};
use affsync_shopify::{ShopifyAdminClient, ShopifySettings};

const API: &str = "/admin/api/2024-10";

fn test_client(server: &MockServer, location_id: Option<i64>) -> ShopifyAdminClient {
    let settings = ShopifySettings {
        timeout: Duration::from_secs(5),
        user_agent: "affsync-test/0.1".to_string(),
        max_retries: 1,
        backoff_base_ms: 0,
    };
    ShopifyAdminClient::new(&server.uri(), "shpat_test", "2024-10", location_id, &settings)
        .expect("failed to build test ShopifyAdminClient")
}

fn draft() -> ProductDraft {
    ProductDraft {
        title: "Blue Hiking Boot".to_string(),
        body_html: "Waterproof".to_string(),
        vendor: "Trail Co".to_string(),
        product_type: "Footwear".to_string(),
        sku: "trail-co-cj-42".to_string(),
        price: Decimal::new(12999, 2),
        compare_at_price: None,
        image_url: "https://cdn.example.com/boot.jpg".to_string(),
        tags: vec!["source:cj".to_string()],
    }
}

fn product_json(id: i64, status: &str) -> serde_json::Value {
    json!({
        "product": {
            "id": id,
            "title": "Blue Hiking Boot",
            "status": status,
            "variants": [{"id": 500, "sku": "trail-co-cj-42", "inventory_item_id": 900}]
        }
    })
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_product_reports_not_found_on_404() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{API}/products/77.json")))
        .and(header("X-Shopify-Access-Token", "shpat_test"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"errors": "Not Found"})))
        .expect(1)
        .mount(&server)
        .await;

    let result = test_client(&server, None).get_product(77).await;
    assert!(
        matches!(&result, Err(e) if e.is_not_found()),
        "expected NotFound, got: {result:?}"
    );
}

#[tokio::test]
async fn get_product_maps_first_variant() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{API}/products/10.json")))
        .respond_with(ResponseTemplate::new(200).set_body_json(product_json(10, "active")))
        .mount(&server)
        .await;

    let product = test_client(&server, None).get_product(10).await.unwrap();
    assert_eq!(product.id, 10);
    assert_eq!(product.status, CatalogStatus::Active);
    assert_eq!(product.variant_id, Some(500));
    assert_eq!(product.inventory_item_id, Some(900));
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{API}/products/10.json")))
        .respond_with(ResponseTemplate::new(502))
        .expect(2)
        .mount(&server)
        .await;

    let result = test_client(&server, None).get_product(10).await;
    assert!(
        matches!(result, Err(CatalogError::UnexpectedStatus { status: 502, .. })),
        "expected UnexpectedStatus, got: {result:?}"
    );
}

#[tokio::test]
async fn unauthorized_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let result = test_client(&server, None).get_product(10).await;
    assert!(
        matches!(result, Err(CatalogError::Auth { status: 401 })),
        "expected Auth, got: {result:?}"
    );
}

#[tokio::test]
async fn create_product_posts_draft_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{API}/products.json")))
        .and(body_partial_json(json!({
            "product": {"title": "Blue Hiking Boot", "status": "draft"}
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(product_json(10, "draft")))
        .expect(1)
        .mount(&server)
        .await;

    let created = test_client(&server, None)
        .create_product(&draft(), CatalogStatus::Draft)
        .await
        .unwrap();
    assert_eq!(created.id, 10);
    assert_eq!(created.status, CatalogStatus::Draft);
}

#[tokio::test]
async fn update_product_keeps_existing_variant() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{API}/products/10.json")))
        .respond_with(ResponseTemplate::new(200).set_body_json(product_json(10, "active")))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("{API}/products/10.json")))
        .and(body_partial_json(json!({"product": {"id": 10}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(product_json(10, "active")))
        .expect(1)
        .mount(&server)
        .await;

    let updated = test_client(&server, None)
        .update_product(10, &draft())
        .await
        .unwrap();
    assert_eq!(updated.variant_id, Some(500));
}

// ---------------------------------------------------------------------------
// SKU lookup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn find_by_sku_requires_exact_match() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{API}/graphql.json")))
        .and(body_partial_json(json!({"variables": {"q": "sku:trail-co-cj-42"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"productVariants": {"edges": [{"node": {
                "id": "gid://shopify/ProductVariant/500",
                "sku": "trail-co-cj-42",
                "inventoryItem": {"id": "gid://shopify/InventoryItem/900"},
                "product": {"id": "gid://shopify/Product/10", "title": "Blue Hiking Boot", "status": "DRAFT"}
            }}]}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{API}/graphql.json")))
        .and(body_partial_json(json!({"variables": {"q": "sku:trail-co-cj-4"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"productVariants": {"edges": [{"node": {
                "id": "gid://shopify/ProductVariant/500",
                "sku": "trail-co-cj-42",
                "product": {"id": "gid://shopify/Product/10", "title": "Blue Hiking Boot"}
            }}]}}
        })))
        .mount(&server)
        .await;

    let client = test_client(&server, None);
    let found = client.find_product_by_sku("trail-co-cj-42").await.unwrap();
    assert_eq!(found.map(|p| (p.id, p.inventory_item_id)), Some((10, Some(900))));

    let near_miss = client.find_product_by_sku("trail-co-cj-4").await.unwrap();
    assert!(near_miss.is_none(), "prefix match must not count");
}

// ---------------------------------------------------------------------------
// Collections, metafields, inventory
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ensure_collection_reuses_existing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{API}/custom_collections.json")))
        .and(query_param("title", "Trail Co - API Products - Draft"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "custom_collections": [{"id": 333, "title": "Trail Co - API Products - Draft"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{API}/custom_collections.json")))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let id = test_client(&server, None)
        .ensure_collection("Trail Co - API Products - Draft")
        .await
        .unwrap();
    assert_eq!(id, 333);
}

#[tokio::test]
async fn ensure_collection_creates_when_missing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{API}/custom_collections.json")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"custom_collections": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{API}/custom_collections.json")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "custom_collection": {"id": 444, "title": "Green Garden - API Products - Draft"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let id = test_client(&server, None)
        .ensure_collection("Green Garden - API Products - Draft")
        .await
        .unwrap();
    assert_eq!(id, 444);
}

#[tokio::test]
async fn duplicate_collect_is_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{API}/collects.json")))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "errors": {"product_id": ["already exists in this collection"]}
        })))
        .mount(&server)
        .await;

    test_client(&server, None)
        .add_to_collection(10, 333)
        .await
        .expect("422 already-exists should be treated as success");
}

#[tokio::test]
async fn affiliate_link_is_a_url_metafield() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{API}/products/10/metafields.json")))
        .and(body_partial_json(json!({"metafield": {
            "namespace": "custom", "key": "affiliate_link", "type": "url"
        }})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"metafield": {"id": 1}})))
        .expect(1)
        .mount(&server)
        .await;

    test_client(&server, None)
        .set_affiliate_link(10, "https://www.anrdoezrs.net/links/1/type/dlg/sid/x/https://a.example")
        .await
        .unwrap();
}

#[tokio::test]
async fn inventory_round_trip_uses_location() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{API}/inventory_levels.json")))
        .and(query_param("inventory_item_ids", "900"))
        .and(query_param("location_ids", "55"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "inventory_levels": [{"inventory_item_id": 900, "location_id": 55, "available": 3}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{API}/inventory_levels/set.json")))
        .and(body_partial_json(json!({"location_id": 55, "inventory_item_id": 900, "available": 0})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"inventory_level": {}})))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server, Some(55));
    assert_eq!(client.available_quantity(900).await.unwrap(), Some(3));
    client.set_available_quantity(900, 0).await.unwrap();
}

#[tokio::test]
async fn setting_stock_without_location_is_rejected_locally() {
    let server = MockServer::start().await;
    let result = test_client(&server, None).set_available_quantity(900, 1).await;
    assert!(
        matches!(result, Err(CatalogError::Rejected { .. })),
        "expected Rejected, got: {result:?}"
    );
}
