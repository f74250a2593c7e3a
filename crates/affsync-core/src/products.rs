//! The canonical product record and its lifecycle.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreError;

/// Which affiliate feed a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedSource {
    /// Query-based catalog keyed by advertiser id.
    Cj,
    /// Page-based catalog keyed by program id.
    Pepperjam,
}

impl FeedSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FeedSource::Cj => "cj",
            FeedSource::Pepperjam => "pepperjam",
        }
    }
}

impl fmt::Display for FeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedSource {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cj" => Ok(FeedSource::Cj),
            "pepperjam" => Ok(FeedSource::Pepperjam),
            other => Err(CoreError::InvalidFeedSource(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    /// Not yet created downstream, or reverted by a soft delete.
    Pending,
    /// A downstream resource exists and is tracked.
    Imported,
    /// The last downstream operation errored.
    Failed,
}

impl ProductStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProductStatus::Pending => "pending",
            ProductStatus::Imported => "imported",
            ProductStatus::Failed => "failed",
        }
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// `Failed -> Imported` is the retry path taken by a later import.
    #[must_use]
    pub fn can_transition_to(self, next: ProductStatus) -> bool {
        matches!(
            (self, next),
            (ProductStatus::Pending | ProductStatus::Failed, ProductStatus::Imported)
                | (ProductStatus::Imported, ProductStatus::Pending)
                | (_, ProductStatus::Failed)
        )
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProductStatus::Pending),
            "imported" => Ok(ProductStatus::Imported),
            "failed" => Ok(ProductStatus::Failed),
            other => Err(CoreError::InvalidProductStatus(other.to_string())),
        }
    }
}

/// Identifiers of the downstream resource backing an imported product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownstreamRef {
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub inventory_item_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalProduct {
    pub id: Uuid,
    pub source_feed: FeedSource,
    pub source_record_id: String,
    pub brand_id: Uuid,
    pub brand_name: String,
    /// Advertiser id (CJ) or program id (Pepperjam) the record was fetched under.
    pub account_id: String,
    pub title: String,
    pub description: String,
    pub price: Decimal,
    pub currency: String,
    pub sale_price: Option<Decimal>,
    pub image_url: String,
    pub product_url: String,
    pub affiliate_url: String,
    pub categories: Vec<String>,
    pub available: bool,
    pub sku: String,
    pub status: ProductStatus,
    pub downstream_id: Option<i64>,
    pub downstream_variant_id: Option<i64>,
    pub inventory_item_id: Option<i64>,
    pub last_updated: Option<DateTime<Utc>>,
    pub keywords_matched: Vec<String>,
    pub last_error: Option<String>,
}

/// Build the deterministic SKU for a product: `{brandSlug}-{sourceFeed}-{sourceRecordId}`.
#[must_use]
pub fn derive_sku(brand_slug: &str, source: FeedSource, source_record_id: &str) -> String {
    format!("{brand_slug}-{source}-{}", source_record_id.trim())
}

/// Returns `sale` only when it is a real discount on `price`.
#[must_use]
pub fn effective_sale_price(price: Decimal, sale: Option<Decimal>) -> Option<Decimal> {
    sale.filter(|s| *s > Decimal::ZERO && *s < price)
}

/// Deduplicate category names, keeping the first occurrence of each.
#[must_use]
pub fn dedup_categories<I>(categories: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out: Vec<String> = Vec::new();
    for category in categories {
        let trimmed = category.trim();
        if trimmed.is_empty() || out.iter().any(|c| c.eq_ignore_ascii_case(trimmed)) {
            continue;
        }
        out.push(trimmed.to_string());
    }
    out
}

impl CanonicalProduct {
    /// Record a successful downstream create or update.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTransition`] when the current status cannot
    /// move to `Imported`. An already-imported product is refreshed in place.
    pub fn mark_imported(
        &mut self,
        downstream: DownstreamRef,
        at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        if self.status != ProductStatus::Imported
            && !self.status.can_transition_to(ProductStatus::Imported)
        {
            return Err(CoreError::InvalidTransition {
                sku: self.sku.clone(),
                from: self.status,
                to: ProductStatus::Imported,
            });
        }
        self.status = ProductStatus::Imported;
        self.downstream_id = Some(downstream.product_id);
        self.downstream_variant_id = downstream.variant_id;
        self.inventory_item_id = downstream.inventory_item_id;
        self.last_updated = Some(at);
        self.last_error = None;
        Ok(())
    }

    /// Record that the last downstream operation failed.
    pub fn mark_failed(&mut self, error: impl Into<String>, at: DateTime<Utc>) {
        self.status = ProductStatus::Failed;
        self.last_error = Some(error.into());
        self.last_updated = Some(at);
    }

    /// The downstream resource no longer exists: forget its identifiers.
    ///
    /// An imported product reverts to `Pending`. A failed product keeps its
    /// status. Returns `true` if anything changed.
    pub fn soft_delete(&mut self, at: DateTime<Utc>) -> bool {
        let had_ids = self.downstream_id.is_some();
        let was_imported = self.status == ProductStatus::Imported;
        if !had_ids && !was_imported {
            return false;
        }
        if was_imported {
            self.status = ProductStatus::Pending;
        }
        self.downstream_id = None;
        self.downstream_variant_id = None;
        self.inventory_item_id = None;
        self.last_updated = Some(at);
        true
    }

    /// Check the record-level invariants.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated invariant.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.price <= Decimal::ZERO {
            return Err(format!("price must be positive, got {}", self.price));
        }
        if self.status == ProductStatus::Imported && self.downstream_id.is_none() {
            return Err(format!("{} is imported without a downstream id", self.sku));
        }
        if let Some(sale) = self.sale_price {
            if sale >= self.price {
                return Err(format!("sale price {sale} is not below price {}", self.price));
            }
        }
        Ok(())
    }

    /// Price to charge downstream: the sale price when one applies.
    #[must_use]
    pub fn selling_price(&self) -> Decimal {
        effective_sale_price(self.price, self.sale_price).unwrap_or(self.price)
    }

    /// Stock level the downstream catalog should carry for this product.
    #[must_use]
    pub fn target_quantity(&self, default_quantity: i64) -> i64 {
        if self.available {
            default_quantity
        } else {
            0
        }
    }

    /// Whether any field that the downstream catalog mirrors differs from `other`.
    #[must_use]
    pub fn differs_from(&self, other: &CanonicalProduct) -> bool {
        self.title != other.title
            || self.description != other.description
            || self.price != other.price
            || self.sale_price != other.sale_price
            || self.currency != other.currency
            || self.image_url != other.image_url
            || self.product_url != other.product_url
            || self.affiliate_url != other.affiliate_url
            || !same_categories(&self.categories, &other.categories)
            || self.available != other.available
    }

    /// Copy the mirrored fields from a freshly normalized record, keeping
    /// identity, lifecycle, and downstream ids.
    pub fn apply_refresh(&mut self, fresh: &CanonicalProduct) {
        self.title.clone_from(&fresh.title);
        self.description.clone_from(&fresh.description);
        self.price = fresh.price;
        self.sale_price = fresh.sale_price;
        self.currency.clone_from(&fresh.currency);
        self.image_url.clone_from(&fresh.image_url);
        self.product_url.clone_from(&fresh.product_url);
        self.affiliate_url.clone_from(&fresh.affiliate_url);
        self.categories.clone_from(&fresh.categories);
        self.available = fresh.available;
        if !fresh.keywords_matched.is_empty() {
            self.keywords_matched.clone_from(&fresh.keywords_matched);
        }
    }
}

/// Category lists are unordered.
fn same_categories(left: &[String], right: &[String]) -> bool {
    left.iter().collect::<HashSet<_>>() == right.iter().collect::<HashSet<_>>()
}


#[cfg(test)]
mod tests {
    use super::test_support::sample_product;
    use super::*;

    fn downstream(id: i64) -> DownstreamRef {
        DownstreamRef {
            product_id: id,
            variant_id: Some(id + 1),
            inventory_item_id: Some(id + 2),
        }
    }

    #[test]
    fn sku_is_deterministic() {
        assert_eq!(derive_sku("trail-co", FeedSource::Cj, "42"), "trail-co-cj-42");
        assert_eq!(
            derive_sku("trail-co", FeedSource::Pepperjam, " 42 "),
            "trail-co-pepperjam-42"
        );
    }

    #[test]
    fn feed_source_parses_case_insensitively() {
        assert_eq!("CJ".parse::<FeedSource>().unwrap(), FeedSource::Cj);
        assert_eq!(
            "pepperjam".parse::<FeedSource>().unwrap(),
            FeedSource::Pepperjam
        );
        assert!("rakuten".parse::<FeedSource>().is_err());
    }

    #[test]
    fn status_transitions_follow_lifecycle() {
        use ProductStatus::{Failed, Imported, Pending};
        assert!(Pending.can_transition_to(Imported));
        assert!(Imported.can_transition_to(Pending));
        assert!(Pending.can_transition_to(Failed));
        assert!(Imported.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Imported));
        assert!(!Failed.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn mark_imported_sets_downstream_ids() {
        let mut p = sample_product();
        p.mark_imported(downstream(10), Utc::now()).unwrap();
        assert_eq!(p.status, ProductStatus::Imported);
        assert_eq!(p.downstream_id, Some(10));
        assert_eq!(p.inventory_item_id, Some(12));
        assert!(p.check_invariants().is_ok());
    }

    #[test]
    fn soft_delete_reverts_imported_to_pending() {
        let mut p = sample_product();
        p.mark_imported(downstream(10), Utc::now()).unwrap();
        assert!(p.soft_delete(Utc::now()));
        assert_eq!(p.status, ProductStatus::Pending);
        assert!(p.downstream_id.is_none());
        assert!(p.downstream_variant_id.is_none());
        assert!(p.inventory_item_id.is_none());
    }

    #[test]
    fn soft_delete_on_failed_clears_ids_but_keeps_status() {
        let mut p = sample_product();
        p.downstream_id = Some(77);
        p.mark_failed("boom", Utc::now());
        assert!(p.soft_delete(Utc::now()));
        assert_eq!(p.status, ProductStatus::Failed);
        assert!(p.downstream_id.is_none());
    }

    #[test]
    fn soft_delete_on_pending_is_noop() {
        let mut p = sample_product();
        assert!(!p.soft_delete(Utc::now()));
    }

    #[test]
    fn sale_price_only_kept_when_discounted() {
        let price = Decimal::new(2000, 2);
        assert_eq!(
            effective_sale_price(price, Some(Decimal::new(1500, 2))),
            Some(Decimal::new(1500, 2))
        );
        assert_eq!(effective_sale_price(price, Some(price)), None);
        assert_eq!(effective_sale_price(price, Some(Decimal::new(2500, 2))), None);
        assert_eq!(effective_sale_price(price, Some(Decimal::ZERO)), None);
    }

    #[test]
    fn categories_dedup_keeps_first_occurrence() {
        let cats = dedup_categories(vec![
            "Boots".to_string(),
            "Outdoor".to_string(),
            "boots".to_string(),
            "  ".to_string(),
        ]);
        assert_eq!(cats, vec!["Boots".to_string(), "Outdoor".to_string()]);
    }

    #[test]
    fn invariants_reject_non_positive_price() {
        let mut p = sample_product();
        p.price = Decimal::ZERO;
        assert!(p.check_invariants().is_err());
    }

    #[test]
    fn invariants_reject_imported_without_downstream_id() {
        let mut p = sample_product();
        p.status = ProductStatus::Imported;
        assert!(p.check_invariants().is_err());
    }

    #[test]
    fn apply_refresh_keeps_lifecycle_fields() {
        let mut stored = sample_product();
        stored
            .mark_imported(downstream(10), Utc::now())
            .unwrap();
        let mut fresh = sample_product();
        fresh.title = "Blue Hiking Boot v2".to_string();
        fresh.price = Decimal::new(9_999, 2);

        assert!(stored.differs_from(&fresh));
        stored.apply_refresh(&fresh);
        assert!(!stored.differs_from(&fresh));
        assert_eq!(stored.status, ProductStatus::Imported);
        assert_eq!(stored.downstream_id, Some(10));
    }

    #[test]
    fn reordered_categories_are_not_a_change() {
        let mut stored = sample_product();
        stored.categories = vec!["Footwear".to_string(), "Outdoor".to_string()];
        let mut fresh = stored.clone();
        fresh.categories = vec!["Outdoor".to_string(), "Footwear".to_string()];
        assert!(!stored.differs_from(&fresh));

        fresh.categories = vec!["Outdoor".to_string()];
        assert!(stored.differs_from(&fresh));
    }

    #[test]
    fn target_quantity_is_zero_when_unavailable() {
        let mut p = sample_product();
        assert_eq!(p.target_quantity(3), 3);
        p.available = false;
        assert_eq!(p.target_quantity(3), 0);
    }
}
