//! Database operations for the `brands` table.

use affsync_core::{Brand, FeedSource};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `brands` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BrandRow {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub feed: String,
    pub feed_account_id: String,
    pub default_keywords: Vec<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<BrandRow> for Brand {
    type Error = DbError;

    fn try_from(row: BrandRow) -> Result<Self, Self::Error> {
        let feed: FeedSource = row.feed.parse().map_err(|e: affsync_core::CoreError| {
            DbError::InvalidRow {
                id: row.id.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Brand {
            id: row.id,
            name: row.name,
            slug: row.slug,
            feed,
            feed_account_id: row.feed_account_id,
            default_keywords: row.default_keywords,
            last_synced_at: row.last_synced_at,
        })
    }
}

const BRAND_COLUMNS: &str = "id, name, slug, feed, feed_account_id, default_keywords, \
                             last_synced_at, created_at, updated_at";

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Returns every brand, ordered by name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_brands(pool: &PgPool) -> Result<Vec<BrandRow>, DbError> {
    let rows = sqlx::query_as::<_, BrandRow>(&format!(
        "SELECT {BRAND_COLUMNS} FROM brands ORDER BY name"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns a single brand by slug, or `None` if not found.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_brand_by_slug(pool: &PgPool, slug: &str) -> Result<Option<BrandRow>, DbError> {
    let row = sqlx::query_as::<_, BrandRow>(&format!(
        "SELECT {BRAND_COLUMNS} FROM brands WHERE slug = $1"
    ))
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Sets `brands.last_synced_at` after a completed run.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no brand has `id`, or [`DbError::Sqlx`]
/// if the update fails.
pub async fn touch_last_synced(
    pool: &PgPool,
    id: Uuid,
    at: DateTime<Utc>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE brands SET last_synced_at = $1, updated_at = NOW() WHERE id = $2",
    )
    .bind(at)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}
