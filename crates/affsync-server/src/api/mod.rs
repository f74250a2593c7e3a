mod brands;
mod ingestions;
mod products;
mod webhooks;

use std::sync::Arc;
use std::time::Duration;

use affsync_core::{BrandStore, RunStore, StoreError};
use affsync_sync::{IngestError, IngestionPipeline, SyncError, WebhookIngestor};
use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, AuthState, RateLimitState, RequestId,
    REQUEST_ID_HEADER,
};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: IngestionPipeline,
    pub brands: Arc<dyn BrandStore>,
    pub runs: Arc<dyn RunStore>,
    pub webhooks: Arc<WebhookIngestor>,
    /// `None` when the stores are not database-backed.
    pub pool: Option<PgPool>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn new(data: T, request_id: String) -> Self {
        Self {
            data,
            meta: ResponseMeta::new(request_id),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "unprocessable" => StatusCode::UNPROCESSABLE_ENTITY,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "upstream_error" => StatusCode::BAD_GATEWAY,
            "feed_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn normalize_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(20).clamp(1, 100)
}

pub(super) fn map_ingest_error(request_id: String, error: &IngestError) -> ApiError {
    let code = match error {
        IngestError::BrandNotFound(_)
        | IngestError::ProductNotFound(_)
        | IngestError::NoMatch(_) => "not_found",
        IngestError::RunInProgress(_) | IngestError::Sync(SyncError::NotImported { .. }) => {
            "conflict"
        }
        IngestError::ConnectorUnavailable(_) => "feed_unavailable",
        IngestError::RecordRejected(_) => "unprocessable",
        IngestError::Feed(_) | IngestError::Sync(_) => "upstream_error",
        IngestError::Store(e) => return map_store_error(request_id, e),
    };
    if code == "upstream_error" {
        tracing::error!(error = %error, "upstream request failed");
    }
    ApiError::new(request_id, code, error.to_string())
}

pub(super) fn map_store_error(request_id: String, error: &StoreError) -> ApiError {
    match error {
        StoreError::NotFound { .. } => ApiError::new(request_id, "not_found", error.to_string()),
        StoreError::Conflict(_) => ApiError::new(request_id, "conflict", error.to_string()),
        StoreError::Backend(_) => {
            tracing::error!(error = %error, "store error");
            ApiError::new(request_id, "internal_error", "internal server error")
        }
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
}

fn protected_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/brands", get(brands::list_brands))
        .route(
            "/api/v1/brands/{slug}/ingestions",
            post(ingestions::start_ingestion).get(ingestions::list_brand_ingestions),
        )
        .route(
            "/api/v1/brands/{slug}/reconcile",
            post(brands::reconcile_brand),
        )
        .route("/api/v1/ingestions/{id}", get(ingestions::get_ingestion))
        .route(
            "/api/v1/products/{id}/refresh",
            post(products::refresh_product),
        )
        .route(
            "/api/v1/products/{id}/publish",
            post(products::publish_product),
        )
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                )),
        )
}

pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new()
        .route("/api/v1/health", get(health))
        .route("/webhooks/shopify", post(webhooks::receive_shopify));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let Some(pool) = &state.pool else {
        return (
            StatusCode::OK,
            Json(ApiResponse::new(
                HealthData {
                    status: "ok",
                    database: "not_configured",
                },
                req_id.0,
            )),
        );
    };

    match affsync_db::health_check(pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::new(
                HealthData {
                    status: "ok",
                    database: "ok",
                },
                req_id.0,
            )),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::new(
                    HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    req_id.0,
                )),
            )
        }
    }
}

pub fn default_rate_limit_state() -> RateLimitState {
    RateLimitState::new(120, Duration::from_secs(60))
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
