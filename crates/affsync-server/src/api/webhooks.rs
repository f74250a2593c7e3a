use affsync_sync::webhook::{HEADER_EVENT_ID, HEADER_HMAC, HEADER_TOPIC, HEADER_TRIGGERED_AT};
use affsync_sync::{InboundWebhook, WebhookError};
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Extension, Json,
};
use chrono::Utc;
use serde::Serialize;

use crate::middleware::RequestId;

use super::{ApiError, AppState};

#[derive(Debug, Serialize)]
pub(super) struct WebhookAck {
    ok: bool,
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// Receives Shopify product webhooks. Anything that passes signature
/// verification is acknowledged, whether or not it changed local state.
pub(super) async fn receive_shopify(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let hook = InboundWebhook {
        event_id: header(&headers, HEADER_EVENT_ID),
        topic: header(&headers, HEADER_TOPIC),
        triggered_at: header(&headers, HEADER_TRIGGERED_AT),
        signature: header(&headers, HEADER_HMAC),
        body: body.to_vec(),
    };

    match state.webhooks.handle(&hook, Utc::now()).await {
        Ok(outcome) => {
            tracing::debug!(?outcome, topic = ?hook.topic, "webhook handled");
            Ok(Json(WebhookAck { ok: true }))
        }
        Err(WebhookError::Unauthorized(reason)) => {
            tracing::warn!(reason, "webhook rejected");
            Err(ApiError::new(req_id.0, "unauthorized", "invalid webhook signature"))
        }
    }
}
