//! Image URL reachability checks.
//!
//! Cheap checks run first (bypass flag, trusted host, image file extension).
//! Everything else is probed over the network with a HEAD request, falling
//! back to a streamed GET when the host refuses HEAD. A definitive negative
//! answer stops immediately; transport failures rotate through browser
//! identities with a growing delay. When every probe fails to get an answer,
//! a looser URL-shape check decides.

use std::time::Duration;

use affsync_core::AppConfig;
use futures::stream::{self, StreamExt};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, StatusCode, Url};

use crate::error::FeedError;

const IMAGE_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".webp", ".avif", ".bmp", ".svg",
];

const BROWSER_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
];

#[derive(Debug, Clone)]
pub struct ImageCheckConfig {
    /// Skip all checks and accept every URL.
    pub bypass: bool,
    /// Lowercase host names whose images are accepted without probing.
    pub trusted_domains: Vec<String>,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Responses declaring fewer bytes than this are treated as placeholders.
    pub min_bytes: u64,
    pub timeout: Duration,
}

impl Default for ImageCheckConfig {
    fn default() -> Self {
        Self {
            bypass: false,
            trusted_domains: vec!["cdn.shopify.com".to_string()],
            max_retries: 2,
            retry_delay: Duration::from_millis(500),
            min_bytes: 1000,
            timeout: Duration::from_secs(5),
        }
    }
}

impl ImageCheckConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            bypass: config.image_check_bypass,
            trusted_domains: config.image_trusted_domains.clone(),
            max_retries: config.image_max_retries,
            retry_delay: Duration::from_millis(config.image_retry_delay_ms),
            min_bytes: config.image_min_bytes,
            timeout: Duration::from_secs(config.request_timeout_secs.clamp(1, 15)),
        }
    }
}

/// What a single probe concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Probe {
    Accepted,
    /// The host answered and the answer is not a usable image.
    Rejected(String),
    /// No usable answer; try again with another identity.
    Inconclusive(String),
}

#[derive(Debug, Clone)]
pub struct ImageChecker {
    client: Client,
    config: ImageCheckConfig,
}

impl ImageChecker {
    /// # Errors
    ///
    /// Returns [`FeedError::Http`] if the HTTP client cannot be constructed.
    pub fn new(config: ImageCheckConfig) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(Duration::from_secs(10)))
            .build()?;
        Ok(Self { client, config })
    }

    #[must_use]
    pub fn config(&self) -> &ImageCheckConfig {
        &self.config
    }

    /// Decide whether `url` points at a usable product image.
    pub async fn is_usable(&self, url: &str) -> bool {
        if self.config.bypass {
            return true;
        }

        let parsed = match Url::parse(url.trim()) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => parsed,
            _ => {
                tracing::warn!(url, "image URL is not an absolute http(s) URL");
                return false;
            }
        };

        if self.is_trusted_host(&parsed) || has_image_extension(&parsed) {
            return true;
        }

        let attempts = self.config.max_retries + 1;
        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(self.config.retry_delay * attempt).await;
            }
            let identity = BROWSER_USER_AGENTS[attempt as usize % BROWSER_USER_AGENTS.len()];

            match self.probe(parsed.as_str(), identity).await {
                Probe::Accepted => return true,
                Probe::Rejected(reason) => {
                    tracing::warn!(url, reason = %reason, "image URL rejected");
                    return false;
                }
                Probe::Inconclusive(reason) => {
                    tracing::debug!(url, attempt, reason = %reason, "image probe inconclusive");
                }
            }
        }

        let lenient = self.lenient_match(url);
        tracing::warn!(
            url,
            attempts,
            accepted = lenient,
            "image probes exhausted, falling back to URL shape"
        );
        lenient
    }

    /// Check many URLs with at most `concurrency` probes in flight.
    pub async fn check_many(&self, urls: Vec<String>, concurrency: usize) -> Vec<(String, bool)> {
        stream::iter(urls.into_iter().map(|url| async move {
            let ok = self.is_usable(&url).await;
            (url, ok)
        }))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await
    }

    async fn probe(&self, url: &str, identity: &str) -> Probe {
        let head = self
            .client
            .head(url)
            .header(USER_AGENT, identity)
            .send()
            .await;

        let (mut response, via_get) = match head {
            Ok(resp)
                if matches!(
                    resp.status(),
                    StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED
                ) =>
            {
                match self
                    .client
                    .get(url)
                    .header(USER_AGENT, identity)
                    .send()
                    .await
                {
                    Ok(resp) => (resp, true),
                    Err(e) => return Probe::Inconclusive(e.to_string()),
                }
            }
            Ok(resp) => (resp, false),
            Err(e) => return Probe::Inconclusive(e.to_string()),
        };

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        let verdict = classify(
            response.status(),
            &content_type,
            content_length,
            self.config.min_bytes,
        );
        if verdict != Probe::Accepted || !via_get {
            return verdict;
        }

        // Only the first chunk is read; the rest of the body is dropped.
        match response.chunk().await {
            Ok(Some(chunk)) if looks_like_html(&chunk) => {
                Probe::Rejected("body is an HTML page".to_string())
            }
            _ => Probe::Accepted,
        }
    }

    fn is_trusted_host(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        self.config
            .trusted_domains
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{d}")))
    }

    /// Last-resort check: any image extension or trusted domain anywhere in the URL.
    fn lenient_match(&self, url: &str) -> bool {
        let lower = url.to_ascii_lowercase();
        IMAGE_EXTENSIONS.iter().any(|ext| lower.contains(ext))
            || self
                .config
                .trusted_domains
                .iter()
                .any(|d| lower.contains(d.as_str()))
    }
}

fn has_image_extension(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

fn is_definitive_negative(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::NOT_FOUND | StatusCode::FORBIDDEN | StatusCode::GONE
    ) || status.is_server_error()
}

fn classify(
    status: StatusCode,
    content_type: &str,
    content_length: Option<u64>,
    min_bytes: u64,
) -> Probe {
    if is_definitive_negative(status) {
        return Probe::Rejected(format!("status {}", status.as_u16()));
    }
    if !status.is_success() {
        return Probe::Inconclusive(format!("status {}", status.as_u16()));
    }

    let type_ok = content_type.is_empty()
        || content_type.starts_with("image/")
        || content_type.starts_with("application/octet-stream");
    if !type_ok {
        return Probe::Rejected(format!("content-type {content_type}"));
    }

    match content_length {
        Some(len) if len < min_bytes => Probe::Rejected(format!("content-length {len}")),
        _ => Probe::Accepted,
    }
}

fn looks_like_html(chunk: &[u8]) -> bool {
    let head = &chunk[..chunk.len().min(256)];
    let text = String::from_utf8_lossy(head).to_ascii_lowercase();
    let text = text.trim_start();
    text.starts_with("<!doctype html") || text.starts_with("<html")
}
