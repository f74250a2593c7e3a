//! Database operations for `products` and `raw_snapshots`.

use affsync_core::{CanonicalProduct, CoreError, FeedSource, RawSnapshot};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: Uuid,
    pub brand_id: Uuid,
    pub source_feed: String,
    pub source_record_id: String,
    pub brand_name: String,
    pub account_id: String,
    pub title: String,
    pub description: String,
    /// `NUMERIC(12,2)`; values with more precision are rounded by Postgres.
    pub price: Decimal,
    pub currency: String,
    pub sale_price: Option<Decimal>,
    pub image_url: String,
    pub product_url: String,
    pub affiliate_url: String,
    pub categories: Vec<String>,
    pub available: bool,
    pub sku: String,
    pub status: String,
    pub downstream_id: Option<i64>,
    pub downstream_variant_id: Option<i64>,
    pub inventory_item_id: Option<i64>,
    pub last_updated: Option<DateTime<Utc>>,
    pub keywords_matched: Vec<String>,
    pub last_error: Option<String>,
}

/// A row from the `raw_snapshots` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RawSnapshotRow {
    pub product_id: Uuid,
    pub source_feed: String,
    pub payload: serde_json::Value,
    pub captured_at: DateTime<Utc>,
}

fn invalid(id: Uuid) -> impl Fn(CoreError) -> DbError {
    move |e| DbError::InvalidRow {
        id: id.to_string(),
        reason: e.to_string(),
    }
}

impl TryFrom<ProductRow> for CanonicalProduct {
    type Error = DbError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let source_feed = row.source_feed.parse().map_err(invalid(row.id))?;
        let status = row.status.parse().map_err(invalid(row.id))?;
        Ok(CanonicalProduct {
            id: row.id,
            source_feed,
            source_record_id: row.source_record_id,
            brand_id: row.brand_id,
            brand_name: row.brand_name,
            account_id: row.account_id,
            title: row.title,
            description: row.description,
            price: row.price,
            currency: row.currency,
            sale_price: row.sale_price,
            image_url: row.image_url,
            product_url: row.product_url,
            affiliate_url: row.affiliate_url,
            categories: row.categories,
            available: row.available,
            sku: row.sku,
            status,
            downstream_id: row.downstream_id,
            downstream_variant_id: row.downstream_variant_id,
            inventory_item_id: row.inventory_item_id,
            last_updated: row.last_updated,
            keywords_matched: row.keywords_matched,
            last_error: row.last_error,
        })
    }
}

impl TryFrom<RawSnapshotRow> for RawSnapshot {
    type Error = DbError;

    fn try_from(row: RawSnapshotRow) -> Result<Self, Self::Error> {
        Ok(RawSnapshot {
            product_id: row.product_id,
            source_feed: row.source_feed.parse().map_err(invalid(row.product_id))?,
            payload: row.payload,
            captured_at: row.captured_at,
        })
    }
}

const PRODUCT_COLUMNS: &str = "id, brand_id, source_feed, source_record_id, brand_name, \
    account_id, title, description, price, currency, sale_price, image_url, product_url, \
    affiliate_url, categories, available, sku, status, downstream_id, downstream_variant_id, \
    inventory_item_id, last_updated, keywords_matched, last_error";

fn convert(rows: Vec<ProductRow>) -> Result<Vec<CanonicalProduct>, DbError> {
    rows.into_iter().map(CanonicalProduct::try_from).collect()
}

// ---------------------------------------------------------------------------
// products operations
// ---------------------------------------------------------------------------

/// Inserts a new product.
///
/// # Errors
///
/// Returns [`DbError::Conflict`] when the id or the
/// `(brand_id, source_feed, source_record_id)` triple already exists.
pub async fn insert_product(pool: &PgPool, product: &CanonicalProduct) -> Result<(), DbError> {
    sqlx::query(&format!(
        "INSERT INTO products ({PRODUCT_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, \
                 $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24)"
    ))
    .bind(product.id)
    .bind(product.brand_id)
    .bind(product.source_feed.as_str())
    .bind(&product.source_record_id)
    .bind(&product.brand_name)
    .bind(&product.account_id)
    .bind(&product.title)
    .bind(&product.description)
    .bind(product.price)
    .bind(&product.currency)
    .bind(product.sale_price)
    .bind(&product.image_url)
    .bind(&product.product_url)
    .bind(&product.affiliate_url)
    .bind(&product.categories)
    .bind(product.available)
    .bind(&product.sku)
    .bind(product.status.as_str())
    .bind(product.downstream_id)
    .bind(product.downstream_variant_id)
    .bind(product.inventory_item_id)
    .bind(product.last_updated)
    .bind(&product.keywords_matched)
    .bind(&product.last_error)
    .execute(pool)
    .await?;

    Ok(())
}

/// Overwrites every mutable column of an existing product.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no product has `product.id`.
pub async fn save_product(pool: &PgPool, product: &CanonicalProduct) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE products SET \
             title                 = $2, \
             description           = $3, \
             price                 = $4, \
             currency              = $5, \
             sale_price            = $6, \
             image_url             = $7, \
             product_url           = $8, \
             affiliate_url         = $9, \
             categories            = $10, \
             available             = $11, \
             status                = $12, \
             downstream_id         = $13, \
             downstream_variant_id = $14, \
             inventory_item_id     = $15, \
             last_updated          = $16, \
             keywords_matched      = $17, \
             last_error            = $18, \
             updated_at            = NOW() \
         WHERE id = $1",
    )
    .bind(product.id)
    .bind(&product.title)
    .bind(&product.description)
    .bind(product.price)
    .bind(&product.currency)
    .bind(product.sale_price)
    .bind(&product.image_url)
    .bind(&product.product_url)
    .bind(&product.affiliate_url)
    .bind(&product.categories)
    .bind(product.available)
    .bind(product.status.as_str())
    .bind(product.downstream_id)
    .bind(product.downstream_variant_id)
    .bind(product.inventory_item_id)
    .bind(product.last_updated)
    .bind(&product.keywords_matched)
    .bind(&product.last_error)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Returns a product by id, or `None`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::InvalidRow`]
/// if a stored enum column cannot be parsed.
pub async fn get_product(pool: &PgPool, id: Uuid) -> Result<Option<CanonicalProduct>, DbError> {
    sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .map(CanonicalProduct::try_from)
    .transpose()
}

/// Looks a product up by its natural key.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_by_source(
    pool: &PgPool,
    brand_id: Uuid,
    source: FeedSource,
    source_record_id: &str,
) -> Result<Option<CanonicalProduct>, DbError> {
    sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products \
         WHERE brand_id = $1 AND source_feed = $2 AND source_record_id = $3"
    ))
    .bind(brand_id)
    .bind(source.as_str())
    .bind(source_record_id)
    .fetch_optional(pool)
    .await?
    .map(CanonicalProduct::try_from)
    .transpose()
}

/// Returns all products of a brand, ordered by SKU.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_products_for_brand(
    pool: &PgPool,
    brand_id: Uuid,
) -> Result<Vec<CanonicalProduct>, DbError> {
    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE brand_id = $1 ORDER BY sku"
    ))
    .bind(brand_id)
    .fetch_all(pool)
    .await?;

    convert(rows)
}

/// Returns every product pointing at a downstream product id. More than one
/// row can match when the same downstream product was adopted by SKU.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_by_downstream_id(
    pool: &PgPool,
    downstream_id: i64,
) -> Result<Vec<CanonicalProduct>, DbError> {
    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE downstream_id = $1 ORDER BY sku"
    ))
    .bind(downstream_id)
    .fetch_all(pool)
    .await?;

    convert(rows)
}

/// Reverts imported products pointing at `downstream_id` to `pending` and
/// clears their downstream ids in one statement.
///
/// Returns the number of rows touched.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn soft_delete_by_downstream_id(
    pool: &PgPool,
    downstream_id: i64,
    at: DateTime<Utc>,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE products SET \
             status = CASE WHEN status = 'imported' THEN 'pending' ELSE status END, \
             downstream_id         = NULL, \
             downstream_variant_id = NULL, \
             inventory_item_id     = NULL, \
             last_updated          = $2, \
             updated_at            = NOW() \
         WHERE downstream_id = $1",
    )
    .bind(downstream_id)
    .bind(at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Replaces the title of products pointing at `downstream_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn refresh_title_by_downstream_id(
    pool: &PgPool,
    downstream_id: i64,
    title: &str,
    at: DateTime<Utc>,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE products SET title = $2, last_updated = $3, updated_at = NOW() \
         WHERE downstream_id = $1",
    )
    .bind(downstream_id)
    .bind(title)
    .bind(at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

// ---------------------------------------------------------------------------
// raw_snapshots operations
// ---------------------------------------------------------------------------

/// Stores the latest raw record for a product, replacing any earlier one.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn save_raw_snapshot(pool: &PgPool, snapshot: &RawSnapshot) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO raw_snapshots (product_id, source_feed, payload, captured_at) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (product_id) DO UPDATE SET \
             source_feed = EXCLUDED.source_feed, \
             payload     = EXCLUDED.payload, \
             captured_at = EXCLUDED.captured_at",
    )
    .bind(snapshot.product_id)
    .bind(snapshot.source_feed.as_str())
    .bind(&snapshot.payload)
    .bind(snapshot.captured_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Returns the stored raw record for a product, if any.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_raw_snapshot(
    pool: &PgPool,
    product_id: Uuid,
) -> Result<Option<RawSnapshot>, DbError> {
    sqlx::query_as::<_, RawSnapshotRow>(
        "SELECT product_id, source_feed, payload, captured_at \
         FROM raw_snapshots WHERE product_id = $1",
    )
    .bind(product_id)
    .fetch_optional(pool)
    .await?
    .map(RawSnapshot::try_from)
    .transpose()
}
