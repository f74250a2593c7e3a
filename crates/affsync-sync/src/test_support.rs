//! Fixtures shared by this crate's unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use affsync_core::{derive_sku, Brand, CanonicalProduct, FeedSource, ProductStatus};
use affsync_feeds::types::{CjMoney, CjProduct};
use affsync_feeds::{
    AffiliateLinkBuilder, FeedConnector, FeedError, FeedFilter, ImageCheckConfig, ImageChecker,
    LinkFormat, Normalizer, RawRecord,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Notify;
use uuid::Uuid;

pub(crate) fn brand() -> Brand {
    Brand {
        id: Uuid::from_u128(7),
        name: "Trail Co".to_string(),
        slug: "trail-co".to_string(),
        feed: FeedSource::Cj,
        feed_account_id: "5550001".to_string(),
        default_keywords: Vec::new(),
        last_synced_at: None,
    }
}

pub(crate) fn product(record_id: &str, title: &str) -> CanonicalProduct {
    let brand = brand();
    CanonicalProduct {
        id: Uuid::new_v4(),
        source_feed: FeedSource::Cj,
        source_record_id: record_id.to_string(),
        brand_id: brand.id,
        brand_name: brand.name,
        account_id: brand.feed_account_id,
        title: title.to_string(),
        description: "Waterproof".to_string(),
        price: Decimal::new(12_999, 2),
        currency: "USD".to_string(),
        sale_price: None,
        image_url: "https://cdn.shopify.com/boot.jpg".to_string(),
        product_url: "https://trail.example.com/boot".to_string(),
        affiliate_url: "https://trail.example.com/boot".to_string(),
        categories: vec!["Footwear".to_string()],
        available: true,
        sku: derive_sku("trail-co", FeedSource::Cj, record_id),
        status: ProductStatus::Pending,
        downstream_id: None,
        downstream_variant_id: None,
        inventory_item_id: None,
        last_updated: None,
        keywords_matched: Vec::new(),
        last_error: None,
    }
}

pub(crate) fn cj_record(id: &str, title: &str, price: &str) -> RawRecord {
    RawRecord::Cj(CjProduct {
        id: Some(id.to_string()),
        advertiser_id: Some("5550001".to_string()),
        advertiser_name: Some("Trail Co".to_string()),
        title: Some(title.to_string()),
        description: Some("Waterproof".to_string()),
        price: Some(CjMoney {
            amount: Some(price.to_string()),
            currency: Some("USD".to_string()),
        }),
        image_link: Some("https://cdn.shopify.com/boot.jpg".to_string()),
        link: Some(format!("https://trail.example.com/{id}")),
        availability: Some("in stock".to_string()),
        product_type: vec!["Footwear".to_string()],
        ..CjProduct::default()
    })
}

/// A CJ connector serving a fixed record list, optionally failing or
/// blocking until released.
pub(crate) struct StaticConnector {
    records: std::sync::Mutex<Vec<RawRecord>>,
    normalizer: Normalizer,
    fail_with_auth: bool,
    gate: Option<Arc<Notify>>,
    pub(crate) fetches: AtomicUsize,
}

impl StaticConnector {
    pub(crate) fn new(records: Vec<RawRecord>) -> Self {
        let images = ImageChecker::new(ImageCheckConfig {
            bypass: true,
            ..ImageCheckConfig::default()
        })
        .expect("image checker");
        Self {
            records: std::sync::Mutex::new(records),
            normalizer: Normalizer::new(
                images,
                AffiliateLinkBuilder::new("https://www.anrdoezrs.net", LinkFormat::DeepLinkPath, None),
            ),
            fail_with_auth: false,
            gate: None,
            fetches: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail_with_auth: true,
            ..Self::new(Vec::new())
        }
    }

    pub(crate) fn gated(records: Vec<RawRecord>, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(records)
        }
    }

    pub(crate) fn set_records(&self, records: Vec<RawRecord>) {
        *self.records.lock().expect("records lock") = records;
    }
}

#[async_trait]
impl FeedConnector for StaticConnector {
    fn feed(&self) -> FeedSource {
        FeedSource::Cj
    }

    fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    async fn fetch_records(&self, _filter: &FeedFilter) -> Result<Vec<RawRecord>, FeedError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail_with_auth {
            return Err(FeedError::Auth {
                feed: FeedSource::Cj,
                status: 401,
            });
        }
        Ok(self.records.lock().expect("records lock").clone())
    }
}
