//! Boundary to the downstream commerce catalog.
//!
//! The sync layer only ever talks to [`CatalogApi`]; the Shopify adapter is
//! one implementation and tests supply in-memory fakes.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::products::CanonicalProduct;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogStatus {
    Active,
    Draft,
    Archived,
}

impl CatalogStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CatalogStatus::Active => "active",
            CatalogStatus::Draft => "draft",
            CatalogStatus::Archived => "archived",
        }
    }
}

/// What the downstream catalog reports about one of its products.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogProduct {
    pub id: i64,
    pub title: String,
    pub status: CatalogStatus,
    pub variant_id: Option<i64>,
    pub sku: Option<String>,
    pub inventory_item_id: Option<i64>,
}

/// Fields written downstream on create and update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductDraft {
    pub title: String,
    pub body_html: String,
    pub vendor: String,
    pub product_type: String,
    pub sku: String,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub image_url: String,
    pub tags: Vec<String>,
}

impl ProductDraft {
    /// Map a canonical product onto a single-variant downstream product.
    ///
    /// A discounted product sells at its sale price with the list price as
    /// the compare-at price.
    #[must_use]
    pub fn from_product(product: &CanonicalProduct) -> Self {
        let selling = product.selling_price();
        let compare_at_price = (selling < product.price).then_some(product.price);
        let mut tags = product.categories.clone();
        tags.push(format!("source:{}", product.source_feed));
        Self {
            title: product.title.clone(),
            body_html: product.description.clone(),
            vendor: product.brand_name.clone(),
            product_type: product.categories.first().cloned().unwrap_or_default(),
            sku: product.sku.clone(),
            price: selling,
            compare_at_price,
            image_url: product.image_url.clone(),
            tags,
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    /// The resource does not exist downstream. Reconciliation treats this as
    /// an out-of-band deletion, not a failure.
    #[error("{resource} {id} not found downstream")]
    NotFound { resource: &'static str, id: String },

    #[error("downstream catalog rate limited (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("downstream catalog rejected credentials (HTTP {status})")]
    Auth { status: u16 },

    #[error("unexpected HTTP status {status} from downstream catalog ({context})")]
    UnexpectedStatus { status: u16, context: String },

    #[error("downstream catalog rejected {context}: {message}")]
    Rejected { context: String, message: String },

    #[error("transport error talking to downstream catalog: {0}")]
    Transport(String),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CatalogError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, CatalogError::NotFound { .. })
    }
}

#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Probe a product by id. A missing product is [`CatalogError::NotFound`].
    async fn get_product(&self, id: i64) -> Result<CatalogProduct, CatalogError>;

    async fn find_product_by_sku(&self, sku: &str)
        -> Result<Option<CatalogProduct>, CatalogError>;

    async fn create_product(
        &self,
        draft: &ProductDraft,
        status: CatalogStatus,
    ) -> Result<CatalogProduct, CatalogError>;

    async fn update_product(
        &self,
        id: i64,
        draft: &ProductDraft,
    ) -> Result<CatalogProduct, CatalogError>;

    async fn set_product_status(&self, id: i64, status: CatalogStatus)
        -> Result<(), CatalogError>;

    async fn set_affiliate_link(&self, id: i64, url: &str) -> Result<(), CatalogError>;

    /// Find or create a collection by title, returning its id.
    async fn ensure_collection(&self, title: &str) -> Result<i64, CatalogError>;

    async fn add_to_collection(&self, product_id: i64, collection_id: i64)
        -> Result<(), CatalogError>;

    /// Current available stock, `None` when no level is recorded yet.
    async fn available_quantity(&self, inventory_item_id: i64)
        -> Result<Option<i64>, CatalogError>;

    async fn set_available_quantity(
        &self,
        inventory_item_id: i64,
        quantity: i64,
    ) -> Result<(), CatalogError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::products::test_support::sample_product;

    #[test]
    fn draft_uses_sale_price_with_compare_at() {
        let mut p = sample_product();
        p.price = Decimal::new(2000, 2);
        p.sale_price = Some(Decimal::new(1500, 2));
        let draft = ProductDraft::from_product(&p);
        assert_eq!(draft.price, Decimal::new(1500, 2));
        assert_eq!(draft.compare_at_price, Some(Decimal::new(2000, 2)));
        assert_eq!(draft.sku, p.sku);
        assert_eq!(draft.vendor, "Trail Co");
    }

    #[test]
    fn draft_without_sale_has_no_compare_at() {
        let p = sample_product();
        let draft = ProductDraft::from_product(&p);
        assert_eq!(draft.price, p.price);
        assert!(draft.compare_at_price.is_none());
        assert_eq!(draft.product_type, "Footwear");
        assert!(draft.tags.contains(&"source:cj".to_string()));
    }

    #[test]
    fn not_found_is_classified() {
        let err = CatalogError::NotFound {
            resource: "product",
            id: "9".to_string(),
        };
        assert!(err.is_not_found());
        assert!(!CatalogError::Auth { status: 401 }.is_not_found());
    }
}
