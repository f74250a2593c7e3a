use affsync_sync::{PublishOutcome, UpdateOutcome};
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_ingest_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct PublishBody {
    pub active: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct ProductActionItem {
    product_id: Uuid,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    catalog_status: Option<&'static str>,
}

fn update_outcome_str(outcome: UpdateOutcome) -> &'static str {
    match outcome {
        UpdateOutcome::Updated => "updated",
        UpdateOutcome::NoChanges => "no_changes",
        UpdateOutcome::Recreated => "recreated",
    }
}

pub(super) async fn refresh_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ProductActionItem>>, ApiError> {
    let outcome = state
        .pipeline
        .refresh_product(id)
        .await
        .map_err(|e| map_ingest_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: ProductActionItem {
            product_id: id,
            outcome: update_outcome_str(outcome),
            catalog_status: None,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn publish_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
    Json(body): Json<PublishBody>,
) -> Result<Json<ApiResponse<ProductActionItem>>, ApiError> {
    let outcome = state
        .pipeline
        .publish_product(id, body.active)
        .await
        .map_err(|e| map_ingest_error(req_id.0.clone(), &e))?;

    let data = match outcome {
        PublishOutcome::Published(status) => ProductActionItem {
            product_id: id,
            outcome: "published",
            catalog_status: Some(status.as_str()),
        },
        PublishOutcome::SoftDeleted => ProductActionItem {
            product_id: id,
            outcome: "soft_deleted",
            catalog_status: None,
        },
    };

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}
