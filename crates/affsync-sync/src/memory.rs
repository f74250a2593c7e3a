//! In-memory implementations of the store and catalog traits, built for
//! tests and enabled for other crates by the `test-support` feature.
//!
//! [`MemoryCatalog`] can simulate out-of-band deletions and outages.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use affsync_core::{
    Brand, BrandStore, CanonicalProduct, CatalogApi, CatalogError, CatalogProduct, CatalogStatus,
    FeedSource, IngestionRun, ProductDraft, ProductStore, RawSnapshot, RunStore, StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct StoreState {
    brands: Vec<Brand>,
    runs: HashMap<Uuid, IngestionRun>,
    products: HashMap<Uuid, CanonicalProduct>,
    snapshots: HashMap<Uuid, RawSnapshot>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a brand, keyed by slug.
    pub async fn upsert_brand(&self, brand: Brand) {
        let mut state = self.state.lock().await;
        state.brands.retain(|b| b.slug != brand.slug);
        state.brands.push(brand);
    }

    pub async fn all_products(&self) -> Vec<CanonicalProduct> {
        self.state.lock().await.products.values().cloned().collect()
    }
}

#[async_trait]
impl BrandStore for MemoryStore {
    async fn get_brand_by_slug(&self, slug: &str) -> Result<Option<Brand>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.brands.iter().find(|b| b.slug == slug).cloned())
    }

    async fn list_brands(&self) -> Result<Vec<Brand>, StoreError> {
        let mut brands = self.state.lock().await.brands.clone();
        brands.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(brands)
    }

    async fn touch_last_synced(&self, brand_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let brand = state
            .brands
            .iter_mut()
            .find(|b| b.id == brand_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "brand",
                id: brand_id.to_string(),
            })?;
        brand.last_synced_at = Some(at);
        Ok(())
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn create_run(&self, run: &IngestionRun) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.runs.contains_key(&run.id) {
            return Err(StoreError::Conflict(format!("run {} exists", run.id)));
        }
        state.runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn update_run(&self, run: &IngestionRun) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        match state.runs.get_mut(&run.id) {
            Some(slot) => {
                *slot = run.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "ingestion run",
                id: run.id.to_string(),
            }),
        }
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<IngestionRun>, StoreError> {
        Ok(self.state.lock().await.runs.get(&id).cloned())
    }

    async fn list_runs_for_brand(
        &self,
        brand_id: Uuid,
        limit: u32,
    ) -> Result<Vec<IngestionRun>, StoreError> {
        let state = self.state.lock().await;
        let mut runs: Vec<_> = state
            .runs
            .values()
            .filter(|r| r.brand_id == brand_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(runs)
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn insert_product(&self, product: &CanonicalProduct) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let duplicate = state.products.values().any(|p| {
            p.id == product.id
                || (p.brand_id == product.brand_id
                    && p.source_feed == product.source_feed
                    && p.source_record_id == product.source_record_id)
        });
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "product {} already stored",
                product.sku
            )));
        }
        state.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn save_product(&self, product: &CanonicalProduct) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        match state.products.get_mut(&product.id) {
            Some(slot) => {
                *slot = product.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "product",
                id: product.id.to_string(),
            }),
        }
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<CanonicalProduct>, StoreError> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn find_by_source(
        &self,
        brand_id: Uuid,
        source: FeedSource,
        source_record_id: &str,
    ) -> Result<Option<CanonicalProduct>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .products
            .values()
            .find(|p| {
                p.brand_id == brand_id
                    && p.source_feed == source
                    && p.source_record_id == source_record_id
            })
            .cloned())
    }

    async fn list_products_for_brand(
        &self,
        brand_id: Uuid,
    ) -> Result<Vec<CanonicalProduct>, StoreError> {
        let state = self.state.lock().await;
        let mut products: Vec<_> = state
            .products
            .values()
            .filter(|p| p.brand_id == brand_id)
            .cloned()
            .collect();
        products.sort_by(|a, b| a.sku.cmp(&b.sku));
        Ok(products)
    }

    async fn find_by_downstream_id(
        &self,
        downstream_id: i64,
    ) -> Result<Vec<CanonicalProduct>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .products
            .values()
            .filter(|p| p.downstream_id == Some(downstream_id))
            .cloned()
            .collect())
    }

    async fn soft_delete_by_downstream_id(
        &self,
        downstream_id: i64,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let mut affected = 0;
        for product in state
            .products
            .values_mut()
            .filter(|p| p.downstream_id == Some(downstream_id))
        {
            if product.soft_delete(at) {
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn refresh_title_by_downstream_id(
        &self,
        downstream_id: i64,
        title: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let mut affected = 0;
        for product in state
            .products
            .values_mut()
            .filter(|p| p.downstream_id == Some(downstream_id))
        {
            title.clone_into(&mut product.title);
            product.last_updated = Some(at);
            affected += 1;
        }
        Ok(affected)
    }

    async fn save_raw_snapshot(&self, snapshot: &RawSnapshot) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.snapshots.insert(snapshot.product_id, snapshot.clone());
        Ok(())
    }

    async fn get_raw_snapshot(
        &self,
        product_id: Uuid,
    ) -> Result<Option<RawSnapshot>, StoreError> {
        Ok(self.state.lock().await.snapshots.get(&product_id).cloned())
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// One product as held by [`MemoryCatalog`].
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub product: CatalogProduct,
    pub draft: ProductDraft,
    pub affiliate_link: Option<String>,
}

struct CatalogState {
    next_id: i64,
    products: HashMap<i64, CatalogEntry>,
    collections: HashMap<String, i64>,
    collects: HashSet<(i64, i64)>,
    stock: HashMap<i64, i64>,
}

pub struct MemoryCatalog {
    state: Mutex<CatalogState>,
    unavailable: AtomicBool,
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self {
            state: Mutex::new(CatalogState {
                next_id: 1,
                products: HashMap::new(),
                collections: HashMap::new(),
                collects: HashSet::new(),
                stock: HashMap::new(),
            }),
            unavailable: AtomicBool::new(false),
        }
    }
}

impl MemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delete a product as if someone removed it in the catalog's admin UI.
    pub async fn remove(&self, id: i64) -> bool {
        self.state.lock().await.products.remove(&id).is_some()
    }

    /// Make every call fail with a transport error until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn entry(&self, id: i64) -> Option<CatalogEntry> {
        self.state.lock().await.products.get(&id).cloned()
    }

    pub async fn product_count(&self) -> usize {
        self.state.lock().await.products.len()
    }

    pub async fn stock(&self, inventory_item_id: i64) -> Option<i64> {
        self.state.lock().await.stock.get(&inventory_item_id).copied()
    }

    pub async fn in_collection(&self, product_id: i64, title: &str) -> bool {
        let state = self.state.lock().await;
        state
            .collections
            .get(title)
            .is_some_and(|cid| state.collects.contains(&(product_id, *cid)))
    }

    fn check_available(&self) -> Result<(), CatalogError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CatalogError::Transport("catalog unavailable".to_string()));
        }
        Ok(())
    }
}

fn missing(resource: &'static str, id: i64) -> CatalogError {
    CatalogError::NotFound {
        resource,
        id: id.to_string(),
    }
}

#[async_trait]
impl CatalogApi for MemoryCatalog {
    async fn get_product(&self, id: i64) -> Result<CatalogProduct, CatalogError> {
        self.check_available()?;
        let state = self.state.lock().await;
        state
            .products
            .get(&id)
            .map(|e| e.product.clone())
            .ok_or_else(|| missing("product", id))
    }

    async fn find_product_by_sku(
        &self,
        sku: &str,
    ) -> Result<Option<CatalogProduct>, CatalogError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .products
            .values()
            .find(|e| e.product.sku.as_deref() == Some(sku))
            .map(|e| e.product.clone()))
    }

    async fn create_product(
        &self,
        draft: &ProductDraft,
        status: CatalogStatus,
    ) -> Result<CatalogProduct, CatalogError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let id = state.next_id;
        state.next_id += 1;
        let product = CatalogProduct {
            id,
            title: draft.title.clone(),
            status,
            variant_id: Some(id * 10),
            sku: Some(draft.sku.clone()),
            inventory_item_id: Some(id * 100),
        };
        state.products.insert(
            id,
            CatalogEntry {
                product: product.clone(),
                draft: draft.clone(),
                affiliate_link: None,
            },
        );
        Ok(product)
    }

    async fn update_product(
        &self,
        id: i64,
        draft: &ProductDraft,
    ) -> Result<CatalogProduct, CatalogError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let entry = state
            .products
            .get_mut(&id)
            .ok_or_else(|| missing("product", id))?;
        entry.draft = draft.clone();
        entry.product.title.clone_from(&draft.title);
        entry.product.sku = Some(draft.sku.clone());
        Ok(entry.product.clone())
    }

    async fn set_product_status(
        &self,
        id: i64,
        status: CatalogStatus,
    ) -> Result<(), CatalogError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let entry = state
            .products
            .get_mut(&id)
            .ok_or_else(|| missing("product", id))?;
        entry.product.status = status;
        Ok(())
    }

    async fn set_affiliate_link(&self, id: i64, url: &str) -> Result<(), CatalogError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let entry = state
            .products
            .get_mut(&id)
            .ok_or_else(|| missing("product", id))?;
        entry.affiliate_link = Some(url.to_string());
        Ok(())
    }

    async fn ensure_collection(&self, title: &str) -> Result<i64, CatalogError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        if let Some(id) = state.collections.get(title) {
            return Ok(*id);
        }
        let id = 10_000 + i64::try_from(state.collections.len()).unwrap_or(0);
        state.collections.insert(title.to_string(), id);
        Ok(id)
    }

    async fn add_to_collection(
        &self,
        product_id: i64,
        collection_id: i64,
    ) -> Result<(), CatalogError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        if !state.products.contains_key(&product_id) {
            return Err(missing("product", product_id));
        }
        state.collects.insert((product_id, collection_id));
        Ok(())
    }

    async fn available_quantity(
        &self,
        inventory_item_id: i64,
    ) -> Result<Option<i64>, CatalogError> {
        self.check_available()?;
        let state = self.state.lock().await;
        let tracked = state
            .products
            .values()
            .any(|e| e.product.inventory_item_id == Some(inventory_item_id));
        if !tracked {
            return Err(missing("inventory item", inventory_item_id));
        }
        Ok(state.stock.get(&inventory_item_id).copied())
    }

    async fn set_available_quantity(
        &self,
        inventory_item_id: i64,
        quantity: i64,
    ) -> Result<(), CatalogError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state.stock.insert(inventory_item_id, quantity);
        Ok(())
    }
}
