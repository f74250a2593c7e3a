use affsync_core::BrandConfig;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// Upsert brands from config into the database, keyed by slug.
///
/// Returns the number of brands processed (inserted or updated). All upserts
/// run inside a single transaction. An existing brand keeps its id and its
/// `last_synced_at`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any database operation fails.
pub async fn seed_brands(pool: &PgPool, brands: &[BrandConfig]) -> Result<usize, DbError> {
    let mut tx = pool.begin().await?;
    let mut count = 0usize;

    for brand in brands {
        let slug = brand.slug();
        sqlx::query(
            "INSERT INTO brands (id, name, slug, feed, feed_account_id, default_keywords) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (slug) DO UPDATE SET \
                 name             = EXCLUDED.name, \
                 feed             = EXCLUDED.feed, \
                 feed_account_id  = EXCLUDED.feed_account_id, \
                 default_keywords = EXCLUDED.default_keywords, \
                 updated_at       = NOW()",
        )
        .bind(Uuid::new_v4())
        .bind(&brand.name)
        .bind(&slug)
        .bind(brand.feed.as_str())
        .bind(brand.account_id.trim())
        .bind(&brand.keywords)
        .execute(&mut *tx)
        .await?;

        tracing::debug!(brand = %slug, feed = %brand.feed, "brand seeded");
        count += 1;
    }

    tx.commit().await?;
    Ok(count)
}
