//! Feed connectors: one trait, one adapter per affiliate network.
//!
//! Each adapter only knows how to page through its network's API and hand
//! back [`RawRecord`]s. Keyword filtering and normalization are shared and
//! live here.

mod cj;
mod pepperjam;

use std::sync::Arc;
use std::time::Duration;

use affsync_core::{AppConfig, CanonicalProduct, FeedSource, RunCounts};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::{Client, Response, StatusCode};

use crate::affiliate::AffiliateLinkBuilder;
use crate::error::FeedError;
use crate::image::ImageChecker;
use crate::keywords::keyword_filter;
use crate::normalize::{BrandContext, Normalizer, SkipReason};
use crate::types::RawRecord;

pub use cj::{CjConnector, CjCredentials};
pub use pepperjam::{PepperjamConnector, PepperjamCredentials};

/// Hard ceiling on pages per fetch, whatever the filter asks for.
///
/// Each page may be retried up to `max_retries` times on transient errors, so
/// the worst-case request count is `MAX_PAGES * (1 + max_retries)`.
pub const MAX_PAGES: u32 = 100;

/// Normalization runs at most this many records (and image probes) at once.
const NORMALIZE_CONCURRENCY: usize = 8;

/// Default wait when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// What to fetch for one brand.
#[derive(Debug, Clone)]
pub struct FeedFilter {
    /// Advertiser id (CJ) or program id (Pepperjam).
    pub account_id: String,
    pub brand: BrandContext,
    pub keywords: Vec<String>,
    /// Total records wanted across all pages.
    pub limit: u32,
    pub offset: u32,
    pub max_pages: u32,
}

impl FeedFilter {
    /// Page budget after applying the global [`MAX_PAGES`] guard.
    #[must_use]
    pub fn page_budget(&self) -> u32 {
        self.max_pages.clamp(1, MAX_PAGES)
    }
}

/// A normalized product together with the record it came from.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub product: CanonicalProduct,
    pub raw: RawRecord,
}

/// Result of a normalized fetch: the products plus per-reason counters.
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    pub products: Vec<Fetched>,
    /// Raw records returned by the feed, before any filtering.
    pub found: u32,
    pub skipped_keyword: u32,
    pub skipped_missing_data: u32,
    pub skipped_invalid_price: u32,
    pub skipped_invalid_image: u32,
    pub skipped_other: u32,
}

impl FetchReport {
    pub fn record_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::MissingData => self.skipped_missing_data += 1,
            SkipReason::InvalidPrice => self.skipped_invalid_price += 1,
            SkipReason::InvalidImage => self.skipped_invalid_image += 1,
            SkipReason::Other => self.skipped_other += 1,
        }
    }

    #[must_use]
    pub fn skipped(&self) -> u32 {
        self.skipped_keyword
            + self.skipped_missing_data
            + self.skipped_invalid_price
            + self.skipped_invalid_image
            + self.skipped_other
    }

    /// Copy the fetch-stage counters into a run's counts.
    pub fn apply_to(&self, counts: &mut RunCounts) {
        counts.found = self.found;
        counts.skipped_keyword = self.skipped_keyword;
        counts.skipped_missing_data = self.skipped_missing_data;
        counts.skipped_invalid_price = self.skipped_invalid_price;
        counts.skipped_invalid_image = self.skipped_invalid_image;
        counts.skipped_other = self.skipped_other;
    }
}

/// Transport settings shared by both adapters.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub user_agent: String,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    /// Minimum spacing between page requests.
    pub min_delay: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: "affsync/0.1 (catalog-sync)".to_string(),
            max_retries: 3,
            backoff_base_ms: 1_000,
            min_delay: Duration::from_millis(1_500),
        }
    }
}

impl HttpSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.request_timeout_secs),
            user_agent: config.user_agent.clone(),
            max_retries: config.max_retries,
            backoff_base_ms: config.retry_backoff_base_ms,
            min_delay: Duration::from_millis(config.inter_request_delay_ms),
        }
    }

    pub(crate) fn build_client(&self) -> Result<Client, FeedError> {
        Ok(Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout.min(Duration::from_secs(10)))
            .user_agent(self.user_agent.as_str())
            .build()?)
    }
}

#[async_trait]
pub trait FeedConnector: Send + Sync {
    fn feed(&self) -> FeedSource;

    fn normalizer(&self) -> &Normalizer;

    /// Page through the feed for `filter` and return every record seen, with
    /// no client-side keyword filtering applied.
    async fn fetch_records(&self, filter: &FeedFilter) -> Result<Vec<RawRecord>, FeedError>;

    /// Records that pass the keyword filter, unvalidated.
    async fn fetch_raw(&self, filter: &FeedFilter) -> Result<Vec<RawRecord>, FeedError> {
        let records = self.fetch_records(filter).await?;
        Ok(records
            .into_iter()
            .filter(|r| keyword_filter(&filter.keywords, &raw_search_fields(r)).is_some())
            .collect())
    }

    /// Records that pass the keyword filter and normalize cleanly.
    async fn fetch_normalized(&self, filter: &FeedFilter) -> Result<FetchReport, FeedError> {
        let records = self.fetch_records(filter).await?;
        let report = normalize_batch(self.normalizer(), records, filter).await;
        tracing::info!(
            feed = %self.feed(),
            brand = %filter.brand.brand_slug,
            found = report.found,
            normalized = report.products.len(),
            skipped = report.skipped(),
            "feed fetch complete"
        );
        Ok(report)
    }
}

/// Raw fetches also match on merchant and product brand.
fn raw_search_fields(record: &RawRecord) -> [&str; 4] {
    [
        record.title(),
        record.description(),
        record.merchant_name(),
        record.brand(),
    ]
}

async fn normalize_batch(
    normalizer: &Normalizer,
    records: Vec<RawRecord>,
    filter: &FeedFilter,
) -> FetchReport {
    let mut report = FetchReport {
        found: u32::try_from(records.len()).unwrap_or(u32::MAX),
        ..FetchReport::default()
    };

    let mut candidates = Vec::with_capacity(records.len());
    for record in records {
        match keyword_filter(&filter.keywords, &[record.title(), record.description()]) {
            Some(matched) => candidates.push((record, matched)),
            None => report.skipped_keyword += 1,
        }
    }

    let results: Vec<_> = stream::iter(candidates.into_iter().map(|(raw, matched)| async move {
        let outcome = normalizer.normalize(&raw, &filter.brand).await;
        (raw, matched, outcome)
    }))
    .buffered(NORMALIZE_CONCURRENCY)
    .collect()
    .await;

    for (raw, matched, outcome) in results {
        match outcome {
            Ok(mut product) => {
                product.keywords_matched = matched;
                report.products.push(Fetched { product, raw });
            }
            Err(reason) => report.record_skip(reason),
        }
    }

    report
}

/// Build the connector for `feed` from application config.
///
/// # Errors
///
/// Returns [`FeedError::MissingCredentials`] when the feed's credentials are
/// not configured, or [`FeedError::Http`] if the HTTP client cannot be built.
pub fn build_connector(
    feed: FeedSource,
    config: &AppConfig,
    images: ImageChecker,
) -> Result<Arc<dyn FeedConnector>, FeedError> {
    let settings = HttpSettings::from_app_config(config);
    let normalizer = Normalizer::new(images, AffiliateLinkBuilder::for_feed(feed, config));

    Ok(match feed {
        FeedSource::Cj => Arc::new(CjConnector::new(
            CjCredentials::from_app_config(config)?,
            &settings,
            normalizer,
        )?),
        FeedSource::Pepperjam => Arc::new(PepperjamConnector::new(
            PepperjamCredentials::from_app_config(config)?,
            &settings,
            normalizer,
        )?),
    })
}

/// Map a non-success status to the feed error taxonomy. Returns the response
/// untouched on 2xx.
pub(crate) async fn check_status(
    feed: FeedSource,
    response: Response,
) -> Result<Response, FeedError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            Err(FeedError::RateLimited {
                feed,
                retry_after_secs,
            })
        }
        StatusCode::BAD_REQUEST => {
            let detail = response.text().await.unwrap_or_default();
            Err(FeedError::MalformedRequest {
                feed,
                detail: truncate(&detail, 500),
            })
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(FeedError::Auth {
            feed,
            status: status.as_u16(),
        }),
        _ => Err(FeedError::UnexpectedStatus {
            status: status.as_u16(),
            url: response.url().to_string(),
        }),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
