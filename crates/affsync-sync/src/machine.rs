//! Product lifecycle against the downstream catalog.
//!
//! `Pending -> Imported` on a successful import, `Imported -> Pending` only
//! when the catalog reports the resource gone, and `* -> Failed` whenever a
//! downstream write errors. Every transition is persisted through the
//! [`ProductStore`] unless the machine runs in dry-run mode.

use std::sync::Arc;

use affsync_core::{
    AppConfig, CanonicalProduct, CatalogApi, CatalogError, CatalogProduct, CatalogStatus,
    DownstreamRef, ProductDraft, ProductStatus, ProductStore,
};
use chrono::Utc;

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Stock carried downstream for an available product.
    pub default_quantity: i64,
    /// Log downstream writes instead of sending them, and persist nothing.
    pub dry_run: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            default_quantity: 1,
            dry_run: false,
        }
    }
}

impl SyncSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            default_quantity: config.default_inventory_quantity,
            dry_run: config.dry_run,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Created,
    /// An existing downstream product (by id or SKU) was updated in place.
    Updated,
    AlreadyImported,
    DryRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    Present,
    SoftDeleted,
    /// Nothing to check: the product has no downstream id.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryOutcome {
    Unchanged,
    Updated { from: Option<i64>, to: i64 },
    SoftDeleted,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    NoChanges,
    /// The downstream product was missing, so it was created again.
    Recreated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Published(CatalogStatus),
    SoftDeleted,
}

/// Title of the unpublished collection new products are filed under.
#[must_use]
pub fn draft_collection_title(brand_name: &str) -> String {
    format!("{brand_name} - API Products - Draft")
}

fn downstream_ref(remote: &CatalogProduct) -> DownstreamRef {
    DownstreamRef {
        product_id: remote.id,
        variant_id: remote.variant_id,
        inventory_item_id: remote.inventory_item_id,
    }
}

pub struct SyncStateMachine {
    catalog: Arc<dyn CatalogApi>,
    products: Arc<dyn ProductStore>,
    settings: SyncSettings,
}

impl SyncStateMachine {
    #[must_use]
    pub fn new(
        catalog: Arc<dyn CatalogApi>,
        products: Arc<dyn ProductStore>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            catalog,
            products,
            settings,
        }
    }

    #[must_use]
    pub fn settings(&self) -> SyncSettings {
        self.settings
    }

    /// Create or update the downstream product and mark it imported.
    ///
    /// An already-imported product is left alone. Updates target the known
    /// downstream id first, then a downstream product carrying the same SKU;
    /// otherwise a draft is created. The affiliate link, draft collection, and
    /// initial stock are set best effort after the product write succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Catalog`] when the product write fails (the product
    /// is marked `Failed` first), or [`SyncError::Store`] if persisting fails.
    pub async fn import(&self, product: &mut CanonicalProduct) -> Result<ImportOutcome, SyncError> {
        if product.status == ProductStatus::Imported {
            return Ok(ImportOutcome::AlreadyImported);
        }
        if self.settings.dry_run {
            tracing::info!(sku = %product.sku, title = %product.title, "dry run: skipping import");
            return Ok(ImportOutcome::DryRun);
        }

        let draft = ProductDraft::from_product(product);
        match self.create_or_update(product, &draft).await {
            Ok((remote, created)) => {
                product.mark_imported(downstream_ref(&remote), Utc::now())?;
                self.attach_extras(product, &remote, created).await;
                self.persist(product).await?;
                tracing::info!(
                    sku = %product.sku,
                    downstream_id = remote.id,
                    created,
                    "product imported"
                );
                Ok(if created {
                    ImportOutcome::Created
                } else {
                    ImportOutcome::Updated
                })
            }
            Err(err) => {
                tracing::warn!(sku = %product.sku, error = %err, "import failed");
                product.mark_failed(err.to_string(), Utc::now());
                self.persist(product).await?;
                Err(err.into())
            }
        }
    }

    /// Probe the downstream product. A missing product means it was deleted
    /// out of band: the local record reverts to `Pending` without alerting.
    ///
    /// # Errors
    ///
    /// Any catalog error other than not-found is returned with no state change.
    pub async fn verify_and_reconcile(
        &self,
        product: &mut CanonicalProduct,
    ) -> Result<Reconciled, SyncError> {
        let Some(downstream_id) = product.downstream_id else {
            return Ok(Reconciled::Skipped);
        };

        match self.catalog.get_product(downstream_id).await {
            Ok(_) => Ok(Reconciled::Present),
            Err(err) if err.is_not_found() => {
                self.reconcile_missing(product).await?;
                Ok(Reconciled::SoftDeleted)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Bring downstream stock to the product's target quantity.
    ///
    /// # Errors
    ///
    /// Returns catalog errors other than not-found, which soft-deletes instead.
    pub async fn sync_inventory(
        &self,
        product: &mut CanonicalProduct,
    ) -> Result<InventoryOutcome, SyncError> {
        let Some(downstream_id) = product.downstream_id else {
            return Ok(InventoryOutcome::Skipped);
        };

        let inventory_item_id = if let Some(id) = product.inventory_item_id {
            id
        } else {
            let remote = match self.catalog.get_product(downstream_id).await {
                Ok(remote) => remote,
                Err(err) => return self.inventory_error(product, err).await,
            };
            let Some(id) = remote.inventory_item_id else {
                return Ok(InventoryOutcome::Skipped);
            };
            product.inventory_item_id = Some(id);
            self.persist(product).await?;
            id
        };

        let target = product.target_quantity(self.settings.default_quantity);
        let current = match self.catalog.available_quantity(inventory_item_id).await {
            Ok(current) => current,
            Err(err) => return self.inventory_error(product, err).await,
        };
        if current == Some(target) {
            return Ok(InventoryOutcome::Unchanged);
        }

        if self.settings.dry_run {
            tracing::info!(sku = %product.sku, ?current, target, "dry run: skipping stock update");
        } else if let Err(err) = self
            .catalog
            .set_available_quantity(inventory_item_id, target)
            .await
        {
            return self.inventory_error(product, err).await;
        }

        tracing::debug!(sku = %product.sku, ?current, target, "stock updated");
        Ok(InventoryOutcome::Updated {
            from: current,
            to: target,
        })
    }

    /// Push a freshly normalized record's mutable fields downstream.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Catalog`] when the update (or the recreate that
    /// follows a missing product) fails; the product is marked `Failed`.
    pub async fn update(
        &self,
        stored: &mut CanonicalProduct,
        fresh: &CanonicalProduct,
    ) -> Result<UpdateOutcome, SyncError> {
        if !stored.differs_from(fresh) {
            return Ok(UpdateOutcome::NoChanges);
        }

        let link_changed = stored.affiliate_url != fresh.affiliate_url;
        let availability_changed = stored.available != fresh.available;
        stored.apply_refresh(fresh);

        let Some(downstream_id) = stored.downstream_id else {
            self.import(stored).await?;
            return Ok(UpdateOutcome::Recreated);
        };

        if self.settings.dry_run {
            tracing::info!(sku = %stored.sku, downstream_id, "dry run: skipping update");
            return Ok(UpdateOutcome::Updated);
        }

        let draft = ProductDraft::from_product(stored);
        match self.catalog.update_product(downstream_id, &draft).await {
            Ok(remote) => {
                stored.mark_imported(downstream_ref(&remote), Utc::now())?;
                if link_changed {
                    if let Err(err) = self
                        .catalog
                        .set_affiliate_link(remote.id, &stored.affiliate_url)
                        .await
                    {
                        tracing::warn!(sku = %stored.sku, error = %err, "affiliate link refresh failed");
                    }
                }
                self.persist(stored).await?;
                if availability_changed {
                    if let Err(err) = self.sync_inventory(stored).await {
                        tracing::warn!(sku = %stored.sku, error = %err, "stock refresh failed");
                    }
                }
                Ok(UpdateOutcome::Updated)
            }
            Err(err) if err.is_not_found() => {
                tracing::info!(
                    sku = %stored.sku,
                    downstream_id,
                    "downstream product missing during update, recreating"
                );
                stored.soft_delete(Utc::now());
                self.import(stored).await?;
                Ok(UpdateOutcome::Recreated)
            }
            Err(err) => {
                tracing::warn!(sku = %stored.sku, error = %err, "update failed");
                stored.mark_failed(err.to_string(), Utc::now());
                self.persist(stored).await?;
                Err(err.into())
            }
        }
    }

    /// Set the downstream product active (`true`) or back to draft.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotImported`] for a product with no downstream id,
    /// or the catalog error for anything but not-found.
    pub async fn publish(
        &self,
        product: &mut CanonicalProduct,
        active: bool,
    ) -> Result<PublishOutcome, SyncError> {
        let Some(downstream_id) = product.downstream_id else {
            return Err(SyncError::NotImported {
                sku: product.sku.clone(),
            });
        };
        let status = if active {
            CatalogStatus::Active
        } else {
            CatalogStatus::Draft
        };

        if self.settings.dry_run {
            tracing::info!(sku = %product.sku, status = status.as_str(), "dry run: skipping publish");
            return Ok(PublishOutcome::Published(status));
        }

        match self.catalog.set_product_status(downstream_id, status).await {
            Ok(()) => Ok(PublishOutcome::Published(status)),
            Err(err) if err.is_not_found() => {
                self.reconcile_missing(product).await?;
                Ok(PublishOutcome::SoftDeleted)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn create_or_update(
        &self,
        product: &CanonicalProduct,
        draft: &ProductDraft,
    ) -> Result<(CatalogProduct, bool), CatalogError> {
        if let Some(id) = product.downstream_id {
            match self.catalog.update_product(id, draft).await {
                Ok(remote) => return Ok((remote, false)),
                Err(err) if err.is_not_found() => {
                    tracing::debug!(sku = %product.sku, id, "known downstream id is gone");
                }
                Err(err) => return Err(err),
            }
        }

        if let Some(existing) = self.catalog.find_product_by_sku(&draft.sku).await? {
            let remote = self.catalog.update_product(existing.id, draft).await?;
            return Ok((remote, false));
        }

        let remote = self
            .catalog
            .create_product(draft, CatalogStatus::Draft)
            .await?;
        Ok((remote, true))
    }

    async fn attach_extras(&self, product: &CanonicalProduct, remote: &CatalogProduct, created: bool) {
        if let Err(err) = self
            .catalog
            .set_affiliate_link(remote.id, &product.affiliate_url)
            .await
        {
            tracing::warn!(sku = %product.sku, error = %err, "setting affiliate link failed");
        }

        if remote.status == CatalogStatus::Draft {
            let title = draft_collection_title(&product.brand_name);
            let filed: Result<(), CatalogError> = async {
                let collection_id = self.catalog.ensure_collection(&title).await?;
                self.catalog.add_to_collection(remote.id, collection_id).await
            }
            .await;
            if let Err(err) = filed {
                tracing::warn!(sku = %product.sku, collection = %title, error = %err, "filing into draft collection failed");
            }
        }

        if created {
            if let Some(inventory_item_id) = remote.inventory_item_id {
                let quantity = product.target_quantity(self.settings.default_quantity);
                if let Err(err) = self
                    .catalog
                    .set_available_quantity(inventory_item_id, quantity)
                    .await
                {
                    tracing::warn!(sku = %product.sku, error = %err, "setting initial stock failed");
                }
            }
        }
    }

    async fn inventory_error(
        &self,
        product: &mut CanonicalProduct,
        err: CatalogError,
    ) -> Result<InventoryOutcome, SyncError> {
        if err.is_not_found() {
            self.reconcile_missing(product).await?;
            return Ok(InventoryOutcome::SoftDeleted);
        }
        Err(err.into())
    }

    async fn reconcile_missing(&self, product: &mut CanonicalProduct) -> Result<(), SyncError> {
        let previous = product.downstream_id;
        if product.soft_delete(Utc::now()) {
            tracing::info!(
                sku = %product.sku,
                downstream_id = ?previous,
                "downstream product gone, reverted to pending"
            );
            self.persist(product).await?;
        }
        Ok(())
    }

    async fn persist(&self, product: &CanonicalProduct) -> Result<(), SyncError> {
        if self.settings.dry_run {
            return Ok(());
        }
        self.products.save_product(product).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "machine_test.rs"]
mod tests;
