use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Process-wide configuration, built once at startup and handed to each
/// component's constructor.
#[derive(Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub brands_path: PathBuf,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,

    pub cj_api_url: String,
    pub cj_api_token: Option<String>,
    pub cj_company_id: Option<String>,
    pub cj_publisher_id: Option<String>,

    pub pepperjam_base_url: String,
    pub pepperjam_api_version: String,
    pub pepperjam_api_key: Option<String>,
    pub pepperjam_creative_id: Option<String>,

    pub shopify_store_url: Option<String>,
    pub shopify_access_token: Option<String>,
    pub shopify_api_version: String,
    pub shopify_location_id: Option<i64>,
    pub shopify_webhook_secret: Option<String>,

    pub webhook_max_age_secs: u64,
    pub webhook_dedup_ttl_secs: u64,
    pub webhook_evict_interval_secs: u64,

    pub image_check_bypass: bool,
    pub image_trusted_domains: Vec<String>,
    pub image_max_retries: u32,
    pub image_retry_delay_ms: u64,
    pub image_min_bytes: u64,

    pub default_inventory_quantity: i64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub inter_request_delay_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_base_ms: u64,
    pub max_concurrent_products: usize,
    pub dry_run: bool,
    pub reconcile_cron: String,
}

fn redact(value: Option<&String>) -> Option<&'static str> {
    value.map(|_| "[redacted]")
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("brands_path", &self.brands_path)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("cj_api_url", &self.cj_api_url)
            .field("cj_api_token", &redact(self.cj_api_token.as_ref()))
            .field("cj_company_id", &self.cj_company_id)
            .field("cj_publisher_id", &self.cj_publisher_id)
            .field("pepperjam_base_url", &self.pepperjam_base_url)
            .field("pepperjam_api_version", &self.pepperjam_api_version)
            .field(
                "pepperjam_api_key",
                &redact(self.pepperjam_api_key.as_ref()),
            )
            .field("pepperjam_creative_id", &self.pepperjam_creative_id)
            .field("shopify_store_url", &self.shopify_store_url)
            .field(
                "shopify_access_token",
                &redact(self.shopify_access_token.as_ref()),
            )
            .field("shopify_api_version", &self.shopify_api_version)
            .field("shopify_location_id", &self.shopify_location_id)
            .field(
                "shopify_webhook_secret",
                &redact(self.shopify_webhook_secret.as_ref()),
            )
            .field("webhook_max_age_secs", &self.webhook_max_age_secs)
            .field("webhook_dedup_ttl_secs", &self.webhook_dedup_ttl_secs)
            .field(
                "webhook_evict_interval_secs",
                &self.webhook_evict_interval_secs,
            )
            .field("image_check_bypass", &self.image_check_bypass)
            .field("image_trusted_domains", &self.image_trusted_domains)
            .field("image_max_retries", &self.image_max_retries)
            .field("image_retry_delay_ms", &self.image_retry_delay_ms)
            .field("image_min_bytes", &self.image_min_bytes)
            .field(
                "default_inventory_quantity",
                &self.default_inventory_quantity,
            )
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("inter_request_delay_ms", &self.inter_request_delay_ms)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_base_ms", &self.retry_backoff_base_ms)
            .field("max_concurrent_products", &self.max_concurrent_products)
            .field("dry_run", &self.dry_run)
            .field("reconcile_cron", &self.reconcile_cron)
            .finish()
    }
}
