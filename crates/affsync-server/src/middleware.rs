//! Request ids, operator bearer auth, and per-caller request budgets.
//!
//! Operator keys are held only as SHA-256 digests and compared in constant
//! time. Rate-limit windows are keyed by the digest of the presented token,
//! so each operator key gets its own budget.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use subtle::{Choice, ConstantTimeEq};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::ApiError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
const API_KEYS_VAR: &str = "AFFSYNC_API_KEYS";
const MAX_REQUEST_ID_LEN: usize = 128;

type KeyDigest = [u8; 32];

/// Request id carried as a request extension and echoed on the response.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl RequestId {
    /// The caller's `x-request-id` when it is printable and short enough,
    /// otherwise a fresh `UUIDv4`.
    fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
            .map_or_else(|| Self(Uuid::new_v4().to_string()), |v| Self(v.to_string()))
    }
}

/// Operator API keys. An empty key set means auth is off.
#[derive(Debug, Clone)]
pub struct AuthState {
    digests: Arc<[KeyDigest]>,
}

impl AuthState {
    /// Reads comma-separated keys from `AFFSYNC_API_KEYS`.
    ///
    /// # Errors
    ///
    /// Fails outside development when no keys are configured.
    pub fn from_env(is_development: bool) -> anyhow::Result<Self> {
        let raw = std::env::var(API_KEYS_VAR).unwrap_or_default();
        Self::from_keys(&raw, is_development)
    }

    /// # Errors
    ///
    /// Fails outside development when `raw` holds no keys.
    pub fn from_keys(raw: &str, is_development: bool) -> anyhow::Result<Self> {
        let mut digests: Vec<KeyDigest> = raw
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(digest)
            .collect();
        digests.sort_unstable();
        digests.dedup();

        if digests.is_empty() {
            anyhow::ensure!(is_development, "{API_KEYS_VAR} is required outside development");
            tracing::warn!("{API_KEYS_VAR} not set; operator routes are unauthenticated");
        }
        Ok(Self {
            digests: digests.into(),
        })
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.digests.is_empty()
    }

    fn allows(&self, token: &str) -> bool {
        let presented = digest(token);
        let hit = self
            .digests
            .iter()
            .fold(Choice::from(0), |acc, d| acc | d[..].ct_eq(&presented[..]));
        bool::from(hit)
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Instant,
    count: usize,
}

/// Fixed request budget per caller per window.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: usize,
    window: Duration,
    windows: Arc<Mutex<HashMap<KeyDigest, Window>>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count one request for `caller`. `false` once its budget is spent.
    async fn admit(&self, caller: KeyDigest) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        windows.retain(|_, w| now.duration_since(w.started_at) < self.window);

        let window = windows.entry(caller).or_insert(Window {
            started_at: now,
            count: 0,
        });
        if window.count >= self.max_requests {
            return false;
        }
        window.count += 1;
        true
    }
}

fn digest(token: &str) -> KeyDigest {
    Sha256::digest(token.as_bytes()).into()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn reject(req: &Request, code: &'static str, message: &'static str) -> Response {
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map_or_else(String::new, |id| id.0.clone());
    ApiError::new(request_id, code, message).into_response()
}

pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = RequestId::from_headers(req.headers());
    let echoed = HeaderValue::from_str(&id.0).ok();
    req.extensions_mut().insert(id);

    let mut res = next.run(req).await;
    if let Some(value) = echoed {
        res.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    res
}

pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Response {
    if !auth.is_enabled() || bearer_token(req.headers()).is_some_and(|t| auth.allows(t)) {
        return next.run(req).await;
    }
    reject(&req, "unauthorized", "missing or invalid bearer token")
}

pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let caller = digest(bearer_token(req.headers()).unwrap_or_default());
    if rate_limit.admit(caller).await {
        return next.run(req).await;
    }
    tracing::debug!(path = %req.uri().path(), "request budget exhausted");
    reject(&req, "rate_limited", "rate limit exceeded")
}
