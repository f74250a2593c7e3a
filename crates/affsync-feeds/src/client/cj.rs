//! CJ product search over GraphQL.

use std::time::Duration;

use affsync_core::{AppConfig, FeedSource};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{check_status, FeedConnector, FeedFilter, HttpSettings};
use crate::error::FeedError;
use crate::normalize::Normalizer;
use crate::planner::{PageWindow, RateLimitPlanner};
use crate::retry::retry_with_backoff;
use crate::types::{CjGraphqlResponse, CjProductPage, RawRecord};

pub const CJ_PAGE_SIZE: u32 = 100;
pub const CJ_MAX_OFFSET: u32 = 10_000;
/// CJ throttles bursts; pages are never requested closer together than this.
pub const CJ_MIN_DELAY: Duration = Duration::from_millis(1_500);

const PRODUCT_FIELDS: &str = "id advertiserId advertiserName title description brand \
     price { amount currency } salePrice { amount currency } imageLink link availability \
     googleProductCategory { id name } productType";

#[derive(Debug, Clone)]
pub struct CjCredentials {
    pub endpoint: String,
    pub token: String,
    pub company_id: String,
    /// Publisher (website) id; when set, tracked click URLs are requested.
    pub publisher_id: Option<String>,
}

impl CjCredentials {
    /// # Errors
    ///
    /// Returns [`FeedError::MissingCredentials`] when the token or company id
    /// is not configured.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, FeedError> {
        let token = config
            .cj_api_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or(FeedError::MissingCredentials {
                feed: FeedSource::Cj,
                var: "CJ_API_TOKEN",
            })?;
        let company_id = config
            .cj_company_id
            .clone()
            .filter(|c| !c.trim().is_empty())
            .ok_or(FeedError::MissingCredentials {
                feed: FeedSource::Cj,
                var: "CJ_COMPANY_ID",
            })?;
        Ok(Self {
            endpoint: config.cj_api_url.clone(),
            token,
            company_id,
            publisher_id: config.cj_publisher_id.clone(),
        })
    }
}

pub struct CjConnector {
    client: Client,
    credentials: CjCredentials,
    planner: RateLimitPlanner,
    normalizer: Normalizer,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl CjConnector {
    /// # Errors
    ///
    /// Returns [`FeedError::Http`] if the HTTP client cannot be built.
    pub fn new(
        credentials: CjCredentials,
        settings: &HttpSettings,
        normalizer: Normalizer,
    ) -> Result<Self, FeedError> {
        Ok(Self {
            client: settings.build_client()?,
            planner: RateLimitPlanner::new(
                CJ_PAGE_SIZE,
                CJ_MAX_OFFSET,
                settings.min_delay.max(CJ_MIN_DELAY),
            ),
            credentials,
            normalizer,
            max_retries: settings.max_retries,
            backoff_base_ms: settings.backoff_base_ms,
        })
    }

    /// Replace the pacing planner. Tests use this to drop the inter-page delay.
    #[must_use]
    pub fn with_planner(mut self, planner: RateLimitPlanner) -> Self {
        self.planner = planner;
        self
    }

    fn query(&self) -> String {
        let link_code = if self.credentials.publisher_id.is_some() {
            " linkCode(pid: $pid) { clickUrl }"
        } else {
            ""
        };
        let pid_param = if self.credentials.publisher_id.is_some() {
            ", $pid: ID!"
        } else {
            ""
        };
        format!(
            "query products($companyId: ID!, $partnerIds: [ID!], $limit: Int, $offset: Int{pid_param}) \
             {{ products(companyId: $companyId, partnerIds: $partnerIds, limit: $limit, offset: $offset) \
             {{ totalCount count resultList {{ {PRODUCT_FIELDS}{link_code} }} }} }}"
        )
    }

    async fn fetch_page(
        &self,
        account_id: &str,
        window: PageWindow,
    ) -> Result<CjProductPage, FeedError> {
        let mut variables = json!({
            "companyId": self.credentials.company_id,
            "partnerIds": [account_id],
            "limit": window.limit,
            "offset": window.offset,
        });
        if let Some(pid) = &self.credentials.publisher_id {
            variables["pid"] = json!(pid);
        }
        let body = json!({ "query": self.query(), "variables": variables });

        let response = self
            .client
            .post(&self.credentials.endpoint)
            .bearer_auth(&self.credentials.token)
            .json(&body)
            .send()
            .await?;
        let response = match check_status(FeedSource::Cj, response).await {
            Ok(response) => response,
            Err(err @ FeedError::MalformedRequest { .. }) => {
                tracing::error!(
                    account_id,
                    offset = window.offset,
                    limit = window.limit,
                    error = %err,
                    "CJ rejected product query"
                );
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        let text = response.text().await?;
        let parsed: CjGraphqlResponse =
            serde_json::from_str(&text).map_err(|e| FeedError::Deserialize {
                context: format!("CJ products(offset={})", window.offset),
                source: e,
            })?;

        if !parsed.errors.is_empty() {
            let message = parsed
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(FeedError::Api {
                feed: FeedSource::Cj,
                message,
            });
        }

        parsed
            .data
            .and_then(|d| d.products)
            .ok_or_else(|| FeedError::Api {
                feed: FeedSource::Cj,
                message: "response carried no products field".to_string(),
            })
    }
}

#[async_trait]
impl FeedConnector for CjConnector {
    fn feed(&self) -> FeedSource {
        FeedSource::Cj
    }

    fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    async fn fetch_records(&self, filter: &FeedFilter) -> Result<Vec<RawRecord>, FeedError> {
        let first = self
            .planner
            .validate(filter.limit.min(self.planner.max_page_size()), filter.offset)?;
        if first.clamped {
            tracing::debug!(
                limit = filter.limit,
                offset = filter.offset,
                "CJ page window clamped"
            );
        }

        let windows = self.planner.plan(filter.offset, filter.limit);
        let mut records = Vec::new();

        for (index, window) in windows
            .into_iter()
            .take(filter.page_budget() as usize)
            .enumerate()
        {
            let delay = self.planner.delay_before(index);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let page = retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
                self.fetch_page(&filter.account_id, window)
            })
            .await?;

            let received = u32::try_from(page.result_list.len()).unwrap_or(u32::MAX);
            tracing::debug!(
                account_id = %filter.account_id,
                offset = window.offset,
                received,
                total = page.total_count,
                "CJ page fetched"
            );
            records.extend(page.result_list.into_iter().map(RawRecord::Cj));

            let reached_end = u64::from(window.offset) + u64::from(received) >= page.total_count;
            if received < window.limit || reached_end {
                break;
            }
        }

        Ok(records)
    }
}
