use affsync_core::{IngestionRun, RunCounts, RunFilter};
use affsync_sync::{IngestError, RunRequest};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{
    map_ingest_error, map_store_error, normalize_limit, ApiError, ApiResponse, AppState,
    ResponseMeta,
};

#[derive(Debug, Deserialize)]
pub(super) struct IngestionsQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub(super) struct IngestionItem {
    ingestion_id: Uuid,
    brand_id: Uuid,
    status: &'static str,
    filter: RunFilter,
    counts: RunCounts,
    error_message: Option<String>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<IngestionRun> for IngestionItem {
    fn from(run: IngestionRun) -> Self {
        Self {
            ingestion_id: run.id,
            brand_id: run.brand_id,
            status: run.status.as_str(),
            filter: run.filter,
            counts: run.counts,
            error_message: run.error_message,
            started_at: run.started_at,
            completed_at: run.completed_at,
        }
    }
}

/// An empty body starts a run with the brand's defaults.
fn parse_run_request(body: &Bytes) -> Result<RunRequest, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(RunRequest::default());
    }
    serde_json::from_slice(body)
}

pub(super) async fn start_ingestion(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(slug): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<ApiResponse<IngestionItem>>), ApiError> {
    let request = parse_run_request(&body).map_err(|e| {
        ApiError::new(
            req_id.0.clone(),
            "validation_error",
            format!("invalid ingestion request: {e}"),
        )
    })?;

    let run = state
        .pipeline
        .start_run(&slug, request)
        .await
        .map_err(|e| map_ingest_error(req_id.0.clone(), &e))?;

    tracing::info!(brand = %slug, run_id = %run.id, "ingestion run accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse {
            data: IngestionItem::from(run),
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

pub(super) async fn list_brand_ingestions(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(slug): Path<String>,
    Query(query): Query<IngestionsQuery>,
) -> Result<Json<ApiResponse<Vec<IngestionItem>>>, ApiError> {
    let brand = state
        .brands
        .get_brand_by_slug(&slug)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?
        .ok_or_else(|| {
            map_ingest_error(req_id.0.clone(), &IngestError::BrandNotFound(slug.clone()))
        })?;

    let runs = state
        .runs
        .list_runs_for_brand(brand.id, normalize_limit(query.limit))
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: runs.into_iter().map(IngestionItem::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn get_ingestion(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<IngestionItem>>, ApiError> {
    let run = state
        .runs
        .get_run(id)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?
        .ok_or_else(|| {
            ApiError::new(
                req_id.0.clone(),
                "not_found",
                format!("ingestion run {id} not found"),
            )
        })?;

    Ok(Json(ApiResponse {
        data: IngestionItem::from(run),
        meta: ResponseMeta::new(req_id.0),
    }))
}
