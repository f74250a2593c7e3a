//! Inbound catalog webhooks: verify, deduplicate, check freshness, apply.
//!
//! Only a bad signature is an error. Every other path resolves to a
//! [`WebhookOutcome`] and the sender is told the event was accepted;
//! processing failures surface in the logs under `webhook_processing_failed`.

use std::sync::Arc;
use std::time::Duration;

use affsync_core::{AppConfig, EventDedupStore, ProductStore};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::WebhookError;

pub const HEADER_EVENT_ID: &str = "x-shopify-webhook-id";
pub const HEADER_TOPIC: &str = "x-shopify-topic";
pub const HEADER_TRIGGERED_AT: &str = "x-shopify-triggered-at";
pub const HEADER_HMAC: &str = "x-shopify-hmac-sha256";

const TOPIC_DELETE: &str = "products/delete";
const TOPIC_UPDATE: &str = "products/update";

type HmacSha256 = Hmac<Sha256>;

/// One delivery as received, before any checks.
#[derive(Debug, Clone, Default)]
pub struct InboundWebhook {
    pub event_id: Option<String>,
    pub topic: Option<String>,
    pub triggered_at: Option<String>,
    pub signature: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied { affected: u64 },
    Duplicate,
    Stale,
    Ignored,
    /// Accepted but not applied; see the error log.
    Failed,
}

#[derive(Debug, Clone)]
pub struct WebhookSettings {
    pub secret: Option<String>,
    pub max_age: Duration,
    pub dedup_ttl: Duration,
}

impl WebhookSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            secret: config.shopify_webhook_secret.clone(),
            max_age: Duration::from_secs(config.webhook_max_age_secs),
            dedup_ttl: Duration::from_secs(config.webhook_dedup_ttl_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProductPayload {
    id: i64,
    #[serde(default)]
    title: Option<String>,
}

/// Whether `signature` is the base64 HMAC-SHA256 of `body` under `secret`.
#[must_use]
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(provided) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = mac.finalize().into_bytes();
    expected.as_slice().ct_eq(provided.as_slice()).into()
}

/// Base64 HMAC-SHA256 of `body`, as the sender computes it.
#[must_use]
pub fn sign(secret: &str, body: &[u8]) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(body);
    STANDARD.encode(mac.finalize().into_bytes())
}

pub struct WebhookIngestor {
    settings: WebhookSettings,
    dedup: Arc<dyn EventDedupStore>,
    products: Arc<dyn ProductStore>,
}

impl WebhookIngestor {
    #[must_use]
    pub fn new(
        settings: WebhookSettings,
        dedup: Arc<dyn EventDedupStore>,
        products: Arc<dyn ProductStore>,
    ) -> Self {
        Self {
            settings,
            dedup,
            products,
        }
    }

    /// Run one delivery through the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookError::Unauthorized`] when no secret is configured or
    /// the signature is missing or does not match. Nothing is recorded then.
    pub async fn handle(
        &self,
        webhook: &InboundWebhook,
        now: DateTime<Utc>,
    ) -> Result<WebhookOutcome, WebhookError> {
        self.authenticate(webhook)?;

        let topic = webhook.topic.as_deref().unwrap_or_default();

        if let Some(event_id) = webhook.event_id.as_deref() {
            match self.dedup.mark_seen(event_id, self.settings.dedup_ttl).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(event_id, topic, "duplicate webhook acknowledged");
                    return Ok(WebhookOutcome::Duplicate);
                }
                Err(e) => {
                    tracing::error!(
                        event = "webhook_processing_failed",
                        event_id,
                        topic,
                        error = %e,
                        "webhook dedup check failed"
                    );
                    return Ok(WebhookOutcome::Failed);
                }
            }
        } else {
            tracing::warn!(topic, "webhook without an event id; duplicates cannot be detected");
        }

        if self.is_stale(webhook.triggered_at.as_deref(), now) {
            tracing::debug!(event_id = ?webhook.event_id, topic, "stale webhook acknowledged");
            return Ok(WebhookOutcome::Stale);
        }

        match self.apply(topic, &webhook.body, now).await {
            Ok(outcome) => Ok(outcome),
            Err(message) => {
                tracing::error!(
                    event = "webhook_processing_failed",
                    event_id = ?webhook.event_id,
                    topic,
                    error = %message,
                    "webhook processing failed"
                );
                Ok(WebhookOutcome::Failed)
            }
        }
    }

    fn authenticate(&self, webhook: &InboundWebhook) -> Result<(), WebhookError> {
        let Some(secret) = self.settings.secret.as_deref().filter(|s| !s.is_empty()) else {
            tracing::warn!("webhook rejected: no signing secret configured");
            return Err(WebhookError::Unauthorized("no signing secret configured"));
        };
        let Some(signature) = webhook.signature.as_deref() else {
            tracing::warn!("webhook rejected: missing signature");
            return Err(WebhookError::Unauthorized("missing signature"));
        };
        if !verify_signature(secret, &webhook.body, signature) {
            tracing::warn!(event_id = ?webhook.event_id, "webhook rejected: signature mismatch");
            return Err(WebhookError::Unauthorized("signature mismatch"));
        }
        Ok(())
    }

    /// Events with no parseable timestamp are treated as fresh.
    fn is_stale(&self, triggered_at: Option<&str>, now: DateTime<Utc>) -> bool {
        let Some(at) = triggered_at.and_then(|raw| DateTime::parse_from_rfc3339(raw.trim()).ok())
        else {
            return false;
        };
        let age = now.signed_duration_since(at.with_timezone(&Utc));
        age.to_std().is_ok_and(|age| age > self.settings.max_age)
    }

    async fn apply(
        &self,
        topic: &str,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<WebhookOutcome, String> {
        if topic != TOPIC_DELETE && topic != TOPIC_UPDATE {
            tracing::debug!(topic, "webhook topic ignored");
            return Ok(WebhookOutcome::Ignored);
        }

        let payload: ProductPayload =
            serde_json::from_slice(body).map_err(|e| format!("invalid {topic} payload: {e}"))?;

        let affected = if topic == TOPIC_DELETE {
            self.products
                .soft_delete_by_downstream_id(payload.id, now)
                .await
                .map_err(|e| e.to_string())?
        } else {
            let Some(title) = payload.title.as_deref().map(str::trim).filter(|t| !t.is_empty())
            else {
                return Ok(WebhookOutcome::Ignored);
            };
            self.products
                .refresh_title_by_downstream_id(payload.id, title, now)
                .await
                .map_err(|e| e.to_string())?
        };

        tracing::info!(topic, downstream_id = payload.id, affected, "webhook applied");
        Ok(WebhookOutcome::Applied { affected })
    }
}

#[cfg(test)]
#[path = "webhook_test.rs"]
mod tests;
