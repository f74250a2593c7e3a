//! Image URL verification for stored products.

use std::collections::HashMap;

use affsync_core::{AppConfig, Brand, BrandStore, ProductStore};
use affsync_db::PgStore;
use affsync_feeds::{ImageCheckConfig, ImageChecker};

async fn brands_to_check(store: &PgStore, brand_filter: Option<&str>) -> anyhow::Result<Vec<Brand>> {
    match brand_filter {
        Some(slug) => {
            let brand = store
                .get_brand_by_slug(slug)
                .await?
                .ok_or_else(|| anyhow::anyhow!("brand '{slug}' not found"))?;
            Ok(vec![brand])
        }
        None => Ok(store.list_brands().await?),
    }
}

/// Re-check every stored product image URL and report the unusable ones.
///
/// The bypass setting is ignored here; a verify pass always probes.
pub(crate) async fn run_verify_images(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    brand_filter: Option<&str>,
    concurrency: usize,
) -> anyhow::Result<()> {
    let store = PgStore::new(pool.clone());
    let brands = brands_to_check(&store, brand_filter).await?;

    // url -> product labels using it
    let mut targets: HashMap<String, Vec<String>> = HashMap::new();
    for brand in &brands {
        for product in store.list_products_for_brand(brand.id).await? {
            targets
                .entry(product.image_url.clone())
                .or_default()
                .push(format!("{} / {}", brand.slug, product.sku));
        }
    }

    if targets.is_empty() {
        println!("no image URLs found to verify");
        return Ok(());
    }

    let checker = ImageChecker::new(ImageCheckConfig {
        bypass: false,
        ..ImageCheckConfig::from_app_config(config)
    })?;
    let results = checker
        .check_many(targets.keys().cloned().collect(), concurrency)
        .await;

    let mut ok_count = 0usize;
    let mut bad_count = 0usize;
    for (url, ok) in results {
        if ok {
            ok_count += 1;
            continue;
        }
        bad_count += 1;
        for label in targets.get(&url).into_iter().flatten() {
            tracing::warn!(product = %label, url = %url, "image URL verification failed");
        }
    }

    println!(
        "image verification complete: {} urls across {} brands, ok={ok_count}, bad={bad_count}",
        ok_count + bad_count,
        brands.len()
    );
    Ok(())
}
