//! Network behaviour of `ImageChecker` against a local `wiremock` server.

use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use affsync_feeds::{ImageCheckConfig, ImageChecker};

fn checker(max_retries: u32, min_bytes: u64) -> ImageChecker {
    ImageChecker::new(ImageCheckConfig {
        bypass: false,
        trusted_domains: vec!["cdn.shopify.com".to_string()],
        max_retries,
        retry_delay: Duration::ZERO,
        min_bytes,
        timeout: Duration::from_secs(5),
    })
    .expect("failed to build test ImageChecker")
}

#[tokio::test]
async fn head_with_image_content_type_is_usable() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/photo"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8; 2_000], "image/jpeg"))
        .mount(&server)
        .await;

    assert!(checker(0, 0).is_usable(&format!("{}/photo", server.uri())).await);
}

#[tokio::test]
async fn html_page_is_rejected_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"))
        .expect(1)
        .mount(&server)
        .await;

    assert!(!checker(2, 0).is_usable(&format!("{}/page", server.uri())).await);
}

#[tokio::test]
async fn head_not_allowed_falls_back_to_get() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/render"))
        .respond_with(ResponseTemplate::new(405))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/render"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0x89u8; 2_000], "image/png"))
        .expect(1)
        .mount(&server)
        .await;

    assert!(checker(0, 1_000).is_usable(&format!("{}/render", server.uri())).await);
}

#[tokio::test]
async fn get_fallback_rejects_html_body() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/render"))
        .respond_with(ResponseTemplate::new(501))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/render"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<!DOCTYPE html><html><body>login</body></html>", "image/png"),
        )
        .mount(&server)
        .await;

    assert!(!checker(0, 0).is_usable(&format!("{}/render", server.uri())).await);
}

#[tokio::test]
async fn tiny_placeholder_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/pixel"))
        .respond_with(ResponseTemplate::new(405))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pixel"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8; 43], "image/gif"))
        .mount(&server)
        .await;

    assert!(!checker(0, 1_000).is_usable(&format!("{}/pixel", server.uri())).await);
}

#[tokio::test]
async fn not_found_is_definitive() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    assert!(!checker(2, 0).is_usable(&format!("{}/gone", server.uri())).await);
}

#[tokio::test]
async fn exhausted_probes_fall_back_to_url_shape() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(429))
        .expect(6)
        .mount(&server)
        .await;

    let c = checker(2, 0);
    // Extension inside a transform path only passes the lenient check.
    assert!(
        c.is_usable(&format!("{}/cdn/photo.jpg/w_200", server.uri()))
            .await
    );
    assert!(!c.is_usable(&format!("{}/cdn/photo/w_200", server.uri())).await);
}

#[tokio::test]
async fn check_many_reports_each_url() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8; 10], "image/webp"))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let urls = vec![
        format!("{}/ok", server.uri()),
        format!("{}/missing", server.uri()),
        "ftp://example.com/a.jpg".to_string(),
    ];
    let mut results = checker(0, 0).check_many(urls, 2).await;
    results.sort();

    let usable: Vec<bool> = results.iter().map(|(_, ok)| *ok).collect();
    assert_eq!(results.len(), 3);
    assert_eq!(usable.iter().filter(|ok| **ok).count(), 1);
    assert!(results
        .iter()
        .any(|(url, ok)| url.ends_with("/ok") && *ok));
}
