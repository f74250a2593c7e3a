//! Raw feed record → [`CanonicalProduct`].

use std::str::FromStr;

use affsync_core::products::{dedup_categories, effective_sale_price};
use affsync_core::{derive_sku, CanonicalProduct, FeedSource, ProductStatus};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::affiliate::AffiliateLinkBuilder;
use crate::image::ImageChecker;
use crate::types::{non_blank, CjProduct, PepperjamProduct, RawRecord};

/// Why a record produced no product. Counted per run, never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    MissingData,
    InvalidPrice,
    InvalidImage,
    Other,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingData => write!(f, "missing-data"),
            SkipReason::InvalidPrice => write!(f, "invalid-price"),
            SkipReason::InvalidImage => write!(f, "invalid-image"),
            SkipReason::Other => write!(f, "other"),
        }
    }
}

/// The brand a batch of records is being normalized for.
#[derive(Debug, Clone)]
pub struct BrandContext {
    pub brand_id: Uuid,
    pub brand_name: String,
    pub brand_slug: String,
    pub account_id: String,
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    images: ImageChecker,
    links: AffiliateLinkBuilder,
}

impl Normalizer {
    #[must_use]
    pub fn new(images: ImageChecker, links: AffiliateLinkBuilder) -> Self {
        Self { images, links }
    }

    #[must_use]
    pub fn images(&self) -> &ImageChecker {
        &self.images
    }

    /// Validate and map one raw record.
    ///
    /// # Errors
    ///
    /// Returns the [`SkipReason`] for a record that must be dropped.
    pub async fn normalize(
        &self,
        record: &RawRecord,
        brand: &BrandContext,
    ) -> Result<CanonicalProduct, SkipReason> {
        let result = match record {
            RawRecord::Cj(p) => self.normalize_cj(p, brand).await,
            RawRecord::Pepperjam(p) => self.normalize_pepperjam(p, brand).await,
        };
        if let Err(reason) = result {
            tracing::debug!(
                feed = %record.feed(),
                record_id = record.record_id().as_deref().unwrap_or("-"),
                title = record.title(),
                reason = %reason,
                "record skipped"
            );
        }
        result
    }

    async fn normalize_cj(
        &self,
        p: &CjProduct,
        brand: &BrandContext,
    ) -> Result<CanonicalProduct, SkipReason> {
        let id = non_blank(p.id.as_deref()).ok_or(SkipReason::MissingData)?;
        let advertiser_id = non_blank(p.advertiser_id.as_deref()).ok_or(SkipReason::MissingData)?;
        let link = non_blank(p.link.as_deref()).ok_or(SkipReason::MissingData)?;
        let image_url = non_blank(p.image_link.as_deref()).ok_or(SkipReason::MissingData)?;
        let title = non_blank(p.title.as_deref()).ok_or(SkipReason::MissingData)?;

        if advertiser_id != brand.account_id.trim() {
            return Err(SkipReason::Other);
        }

        let amount = p.price.as_ref().and_then(|m| m.amount.as_deref());
        let price = positive_price(amount)?;
        let sale_price = parse_decimal(p.sale_price.as_ref().and_then(|m| m.amount.as_deref()));
        let currency = p
            .price
            .as_ref()
            .and_then(|m| non_blank(m.currency.as_deref()))
            .map_or_else(|| "USD".to_string(), |c| c.to_ascii_uppercase());

        if !self.images.is_usable(&image_url).await {
            return Err(SkipReason::InvalidImage);
        }

        let categories = dedup_categories(
            p.product_type.iter().cloned().chain(
                p.google_product_category
                    .as_ref()
                    .and_then(|c| c.name.clone()),
            ),
        );
        let available = p
            .availability
            .as_deref()
            .map(|a| a.trim().to_ascii_lowercase().replace('_', " "))
            .is_some_and(|a| a == "in stock");

        let sku = derive_sku(&brand.brand_slug, FeedSource::Cj, &id);
        let affiliate_url = match p.link_code.as_ref().and_then(|l| l.click_url.as_deref()) {
            Some(click) if self.links.is_tracked(click) => click.to_string(),
            _ => self.links.build(&link, &sku),
        };

        Ok(CanonicalProduct {
            id: Uuid::new_v4(),
            source_feed: FeedSource::Cj,
            source_record_id: id,
            brand_id: brand.brand_id,
            brand_name: brand.brand_name.clone(),
            account_id: advertiser_id,
            title,
            description: p.description.clone().unwrap_or_default().trim().to_string(),
            price,
            currency,
            sale_price: effective_sale_price(price, sale_price),
            image_url,
            product_url: link,
            affiliate_url,
            categories,
            available,
            sku,
            status: ProductStatus::Pending,
            downstream_id: None,
            downstream_variant_id: None,
            inventory_item_id: None,
            last_updated: None,
            keywords_matched: Vec::new(),
            last_error: None,
        })
    }

    async fn normalize_pepperjam(
        &self,
        p: &PepperjamProduct,
        brand: &BrandContext,
    ) -> Result<CanonicalProduct, SkipReason> {
        let id = p.dedup_key().ok_or(SkipReason::Other)?;
        let buy_url = non_blank(p.buy_url.as_deref()).ok_or(SkipReason::MissingData)?;
        let image_url = non_blank(p.image_url.as_deref()).ok_or(SkipReason::MissingData)?;
        let title = non_blank(p.name.as_deref()).ok_or(SkipReason::MissingData)?;

        let price = positive_price(p.price.as_deref())?;
        let sale_price = parse_decimal(p.price_sale.as_deref());

        if !self.images.is_usable(&image_url).await {
            return Err(SkipReason::InvalidImage);
        }

        let description = non_blank(p.description_long.as_deref())
            .or_else(|| non_blank(p.description_short.as_deref()))
            .unwrap_or_default();
        let categories = dedup_categories(p.categories.iter().filter_map(|c| c.name.clone()));
        let currency = currency_code(p.currency.as_deref().or(p.currency_symbol.as_deref()));

        let sku = derive_sku(&brand.brand_slug, FeedSource::Pepperjam, &id);
        let affiliate_url = if self.links.is_tracked(&buy_url) {
            buy_url.clone()
        } else {
            self.links.build(&buy_url, &sku)
        };

        Ok(CanonicalProduct {
            id: Uuid::new_v4(),
            source_feed: FeedSource::Pepperjam,
            source_record_id: id,
            brand_id: brand.brand_id,
            brand_name: brand.brand_name.clone(),
            account_id: non_blank(p.program_id.as_deref())
                .unwrap_or_else(|| brand.account_id.clone()),
            title,
            description,
            price,
            currency,
            sale_price: effective_sale_price(price, sale_price),
            image_url,
            product_url: buy_url,
            affiliate_url,
            categories,
            available: pepperjam_available(p.stock_availability.as_deref()),
            sku,
            status: ProductStatus::Pending,
            downstream_id: None,
            downstream_variant_id: None,
            inventory_item_id: None,
            last_updated: None,
            keywords_matched: Vec::new(),
            last_error: None,
        })
    }
}

fn parse_decimal(raw: Option<&str>) -> Option<Decimal> {
    let cleaned: String = raw?
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' ' | '€' | '£'))
        .collect();
    Decimal::from_str(&cleaned).ok()
}

fn positive_price(raw: Option<&str>) -> Result<Decimal, SkipReason> {
    let raw = non_blank(raw).ok_or(SkipReason::MissingData)?;
    match parse_decimal(Some(&raw)) {
        Some(price) if price > Decimal::ZERO => Ok(price),
        _ => Err(SkipReason::InvalidPrice),
    }
}

/// Absent stock info means available.
fn pepperjam_available(raw: Option<&str>) -> bool {
    let Some(value) = non_blank(raw) else {
        return true;
    };
    let value = value.to_ascii_lowercase();
    if value.contains("out of stock") || value.contains("unavailable") {
        return false;
    }
    value.contains("in stock") || value.contains("available")
}

fn currency_code(raw: Option<&str>) -> String {
    match non_blank(raw).as_deref() {
        Some(code) if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) => {
            code.to_ascii_uppercase()
        }
        Some("€") => "EUR".to_string(),
        Some("£") => "GBP".to_string(),
        _ => "USD".to_string(),
    }
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
