//! Shopify Admin API wire types (REST and the one GraphQL query we use).

use affsync_core::{CatalogProduct, CatalogStatus};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ProductEnvelope {
    pub product: ShopifyProduct,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShopifyProduct {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub variants: Vec<ShopifyVariant>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShopifyVariant {
    pub id: i64,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub inventory_item_id: Option<i64>,
}

impl ShopifyProduct {
    #[must_use]
    pub fn into_catalog(self) -> CatalogProduct {
        let variant = self.variants.into_iter().next();
        CatalogProduct {
            id: self.id,
            title: self.title,
            status: parse_status(self.status.as_deref()),
            variant_id: variant.as_ref().map(|v| v.id),
            sku: variant.as_ref().and_then(|v| v.sku.clone()),
            inventory_item_id: variant.and_then(|v| v.inventory_item_id),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomCollectionsEnvelope {
    #[serde(default)]
    pub custom_collections: Vec<CustomCollection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomCollectionEnvelope {
    pub custom_collection: CustomCollection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomCollection {
    pub id: i64,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InventoryLevelsEnvelope {
    #[serde(default)]
    pub inventory_levels: Vec<InventoryLevel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InventoryLevel {
    pub inventory_item_id: i64,
    #[serde(default)]
    pub location_id: Option<i64>,
    #[serde(default)]
    pub available: Option<i64>,
}

// ---------------------------------------------------------------------------
// GraphQL: variant lookup by SKU
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct GraphqlResponse<T> {
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphqlError {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantsBySku {
    pub product_variants: Connection<VariantNode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Connection<T> {
    #[serde(default = "Vec::new")]
    pub edges: Vec<Edge<T>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Edge<T> {
    pub node: T,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantNode {
    pub id: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub inventory_item: Option<GidRef>,
    pub product: VariantProduct,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GidRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VariantProduct {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: Option<String>,
}

impl VariantNode {
    /// `None` when the product gid is not numeric.
    #[must_use]
    pub fn into_catalog(self) -> Option<CatalogProduct> {
        Some(CatalogProduct {
            id: gid_to_id(&self.product.id)?,
            title: self.product.title,
            status: parse_status(self.product.status.as_deref()),
            variant_id: gid_to_id(&self.id),
            sku: self.sku,
            inventory_item_id: self.inventory_item.and_then(|r| gid_to_id(&r.id)),
        })
    }
}

/// `gid://shopify/Product/123` → `123`.
#[must_use]
pub fn gid_to_id(gid: &str) -> Option<i64> {
    gid.rsplit('/').next()?.parse().ok()
}

/// REST reports lowercase, GraphQL uppercase. Unknown values read as draft.
#[must_use]
pub fn parse_status(raw: Option<&str>) -> CatalogStatus {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        Some("active") => CatalogStatus::Active,
        Some("archived") => CatalogStatus::Archived,
        _ => CatalogStatus::Draft,
    }
}
