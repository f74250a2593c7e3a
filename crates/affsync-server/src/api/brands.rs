use affsync_core::Brand;
use affsync_sync::ReconcileSummary;
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::middleware::RequestId;

use super::{map_ingest_error, map_store_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(super) struct BrandItem {
    slug: String,
    name: String,
    feed: &'static str,
    feed_account_id: String,
    default_keywords: Vec<String>,
    last_synced_at: Option<DateTime<Utc>>,
}

impl From<Brand> for BrandItem {
    fn from(brand: Brand) -> Self {
        Self {
            slug: brand.slug,
            name: brand.name,
            feed: brand.feed.as_str(),
            feed_account_id: brand.feed_account_id,
            default_keywords: brand.default_keywords,
            last_synced_at: brand.last_synced_at,
        }
    }
}

pub(super) async fn list_brands(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<BrandItem>>>, ApiError> {
    let brands = state
        .brands
        .list_brands()
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: brands.into_iter().map(BrandItem::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn reconcile_brand(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<ReconcileSummary>>, ApiError> {
    let summary = state
        .pipeline
        .reconcile_brand(&slug)
        .await
        .map_err(|e| map_ingest_error(req_id.0.clone(), &e))?;

    tracing::info!(
        brand = %slug,
        checked = summary.checked,
        soft_deleted = summary.soft_deleted,
        "reconcile requested via api"
    );

    Ok(Json(ApiResponse {
        data: summary,
        meta: ResponseMeta::new(req_id.0),
    }))
}
