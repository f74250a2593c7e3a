//! Pepperjam publisher product creatives over REST.

use std::collections::HashSet;

use affsync_core::{AppConfig, FeedSource};
use async_trait::async_trait;
use reqwest::{Client, Url};

use super::{check_status, FeedConnector, FeedFilter, HttpSettings};
use crate::error::FeedError;
use crate::normalize::Normalizer;
use crate::planner::RateLimitPlanner;
use crate::retry::retry_with_backoff;
use crate::types::{PepperjamProduct, PepperjamResponse, RawRecord};

pub const PEPPERJAM_PAGE_SIZE: u32 = 50;
/// Deepest record reachable through `page * limit`.
pub const PEPPERJAM_MAX_OFFSET: u32 = 10_000;

#[derive(Debug, Clone)]
pub struct PepperjamCredentials {
    pub base_url: String,
    pub api_version: String,
    pub api_key: String,
}

impl PepperjamCredentials {
    /// # Errors
    ///
    /// Returns [`FeedError::MissingCredentials`] when the API key is not configured.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, FeedError> {
        let api_key = config
            .pepperjam_api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(FeedError::MissingCredentials {
                feed: FeedSource::Pepperjam,
                var: "PEPPERJAM_API_KEY",
            })?;
        Ok(Self {
            base_url: config.pepperjam_base_url.clone(),
            api_version: config.pepperjam_api_version.clone(),
            api_key,
        })
    }
}

pub struct PepperjamConnector {
    client: Client,
    endpoint: Url,
    api_key: String,
    planner: RateLimitPlanner,
    normalizer: Normalizer,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl PepperjamConnector {
    /// # Errors
    ///
    /// Returns [`FeedError::InvalidUrl`] when the base URL does not parse, or
    /// [`FeedError::Http`] if the HTTP client cannot be built.
    pub fn new(
        credentials: PepperjamCredentials,
        settings: &HttpSettings,
        normalizer: Normalizer,
    ) -> Result<Self, FeedError> {
        let raw = format!(
            "{}/{}/publisher/creative/product",
            credentials.base_url.trim_end_matches('/'),
            credentials.api_version.trim_matches('/')
        );
        let endpoint = Url::parse(&raw).map_err(|e| FeedError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client: settings.build_client()?,
            endpoint,
            api_key: credentials.api_key,
            planner: RateLimitPlanner::new(
                PEPPERJAM_PAGE_SIZE,
                PEPPERJAM_MAX_OFFSET,
                settings.min_delay,
            ),
            normalizer,
            max_retries: settings.max_retries,
            backoff_base_ms: settings.backoff_base_ms,
        })
    }

    #[must_use]
    pub fn with_planner(mut self, planner: RateLimitPlanner) -> Self {
        self.planner = planner;
        self
    }

    fn page_url(&self, program_id: &str, keyword: Option<&str>, page: u32) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("apiKey", &self.api_key);
            pairs.append_pair("format", "json");
            pairs.append_pair("programIds", program_id);
            if let Some(keyword) = keyword {
                pairs.append_pair("keywords", keyword);
            }
            pairs.append_pair("page", &page.to_string());
            pairs.append_pair("limit", &self.planner.max_page_size().to_string());
        }
        url
    }

    async fn fetch_page(&self, url: &Url, page: u32) -> Result<Vec<PepperjamProduct>, FeedError> {
        let response = self.client.get(url.clone()).send().await?;
        let response = check_status(FeedSource::Pepperjam, response).await?;
        let text = response.text().await?;
        let parsed: PepperjamResponse =
            serde_json::from_str(&text).map_err(|e| FeedError::Deserialize {
                context: format!("Pepperjam creative/product(page={page})"),
                source: e,
            })?;

        if parsed.meta.status.code != 200 {
            return Err(FeedError::Api {
                feed: FeedSource::Pepperjam,
                message: format!(
                    "status {}: {}",
                    parsed.meta.status.code,
                    parsed.meta.status.message.unwrap_or_default()
                ),
            });
        }

        Ok(parsed.data)
    }

    /// Pages to request per keyword: enough to cover `limit`, within budget.
    fn page_cap(&self, filter: &FeedFilter) -> u32 {
        filter
            .limit
            .max(1)
            .div_ceil(self.planner.max_page_size())
            .min(filter.page_budget())
    }
}

#[async_trait]
impl FeedConnector for PepperjamConnector {
    fn feed(&self) -> FeedSource {
        FeedSource::Pepperjam
    }

    fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    async fn fetch_records(&self, filter: &FeedFilter) -> Result<Vec<RawRecord>, FeedError> {
        let window = self
            .planner
            .validate(self.planner.max_page_size(), filter.offset)?;
        let page_size = self.planner.max_page_size();
        let first_page = window.offset / page_size + 1;
        let page_cap = self.page_cap(filter);

        // A server-side keyword search per keyword; no keywords means one
        // unfiltered pass.
        let searches: Vec<Option<&str>> = if filter.keywords.is_empty() {
            vec![None]
        } else {
            filter.keywords.iter().map(|k| Some(k.as_str())).collect()
        };

        let mut seen: HashSet<String> = HashSet::new();
        let mut records: Vec<RawRecord> = Vec::new();
        let mut request_index = 0usize;
        let wanted = filter.limit as usize;

        'searches: for keyword in searches {
            for page in first_page..first_page + page_cap {
                if u64::from(page) * u64::from(page_size) > u64::from(self.planner.max_offset()) {
                    break;
                }

                let delay = self.planner.delay_before(request_index);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                request_index += 1;

                let url = self.page_url(&filter.account_id, keyword, page);
                let batch = retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
                    self.fetch_page(&url, page)
                })
                .await?;
                let received = batch.len();
                tracing::debug!(
                    program_id = %filter.account_id,
                    keyword = keyword.unwrap_or("-"),
                    page,
                    received,
                    "Pepperjam page fetched"
                );

                for product in batch {
                    // Keyless records pass through; normalization counts them.
                    if let Some(key) = product.dedup_key() {
                        if !seen.insert(key) {
                            continue;
                        }
                    }
                    records.push(RawRecord::Pepperjam(product));
                    if records.len() >= wanted {
                        break 'searches;
                    }
                }

                if received < page_size as usize {
                    break;
                }
            }
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affiliate::{AffiliateLinkBuilder, LinkFormat};
    use crate::image::{ImageCheckConfig, ImageChecker};
    use crate::normalize::BrandContext;

    fn connector() -> PepperjamConnector {
        let normalizer = Normalizer::new(
            ImageChecker::new(ImageCheckConfig {
                bypass: true,
                ..ImageCheckConfig::default()
            })
            .unwrap(),
            AffiliateLinkBuilder::new("https://www.gopjn.com", LinkFormat::RedirectQuery, None),
        );
        PepperjamConnector::new(
            PepperjamCredentials {
                base_url: "https://api.pepperjamnetwork.com/".into(),
                api_version: "20120402".into(),
                api_key: "secret key".into(),
            },
            &HttpSettings::default(),
            normalizer,
        )
        .unwrap()
    }

    fn filter(limit: u32, max_pages: u32) -> FeedFilter {
        FeedFilter {
            account_id: "8080".into(),
            brand: BrandContext {
                brand_id: uuid::Uuid::nil(),
                brand_name: "Green Garden".into(),
                brand_slug: "green-garden".into(),
                account_id: "8080".into(),
            },
            keywords: Vec::new(),
            limit,
            offset: 0,
            max_pages,
        }
    }

    #[test]
    fn page_url_carries_all_parameters() {
        let url = connector().page_url("8080", Some("hose"), 2);
        assert_eq!(
            url.as_str(),
            "https://api.pepperjamnetwork.com/20120402/publisher/creative/product?apiKey=secret+key&format=json&programIds=8080&keywords=hose&page=2&limit=50"
        );
    }

    #[test]
    fn page_cap_covers_limit_within_budget() {
        let c = connector();
        assert_eq!(c.page_cap(&filter(75, 10)), 2);
        assert_eq!(c.page_cap(&filter(50, 10)), 1);
        assert_eq!(c.page_cap(&filter(1_000, 3)), 3);
        assert_eq!(c.page_cap(&filter(0, 10)), 1);
    }
}
