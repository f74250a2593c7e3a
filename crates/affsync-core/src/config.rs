use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    load_app_config_with(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be driven by a plain
/// `HashMap` lookup.
///
/// # Errors
///
/// Returns `ConfigError` if required vars are missing or values are invalid.
#[allow(clippy::too_many_lines)]
pub fn load_app_config_with<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_i64 = |var: &str, default: &str| -> Result<i64, ConfigError> {
        or_default(var, default)
            .parse::<i64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_bool = |var: &str, default: &str| -> Result<bool, ConfigError> {
        let raw = or_default(var, default);
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            other => Err(invalid(var, format!("expected a boolean, got '{other}'"))),
        }
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("AFFSYNC_ENV", "development"))?;
    let bind_addr = parse_addr("AFFSYNC_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("AFFSYNC_LOG_LEVEL", "info");
    let brands_path = PathBuf::from(or_default("AFFSYNC_BRANDS_PATH", "./config/brands.yaml"));

    let db_max_connections = parse_u32("AFFSYNC_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("AFFSYNC_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("AFFSYNC_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let cj_api_url = or_default("CJ_API_URL", "https://ads.api.cj.com/query");
    let cj_api_token = optional("CJ_API_TOKEN");
    let cj_company_id = optional("CJ_COMPANY_ID");
    let cj_publisher_id = optional("CJ_PUBLISHER_ID");

    let pepperjam_base_url = or_default("PEPPERJAM_BASE_URL", "https://api.pepperjamnetwork.com");
    let pepperjam_api_version = or_default("PEPPERJAM_API_VERSION", "20120402");
    let pepperjam_api_key = optional("PEPPERJAM_API_KEY");
    let pepperjam_creative_id = optional("PEPPERJAM_CREATIVE_ID");

    let shopify_store_url = optional("SHOPIFY_STORE_URL");
    let shopify_access_token = optional("SHOPIFY_ACCESS_TOKEN");
    let shopify_api_version = or_default("SHOPIFY_API_VERSION", "2024-10");
    let shopify_location_id = optional("SHOPIFY_LOCATION_ID")
        .map(|raw| {
            raw.parse::<i64>()
                .map_err(|e| invalid("SHOPIFY_LOCATION_ID", e.to_string()))
        })
        .transpose()?;
    let shopify_webhook_secret = optional("SHOPIFY_WEBHOOK_SECRET");

    let webhook_max_age_secs = parse_u64("AFFSYNC_WEBHOOK_MAX_AGE_SECS", "86400")?;
    let webhook_dedup_ttl_secs = parse_u64("AFFSYNC_WEBHOOK_DEDUP_TTL_SECS", "86400")?;
    let webhook_evict_interval_secs = parse_u64("AFFSYNC_WEBHOOK_EVICT_INTERVAL_SECS", "300")?;

    let image_check_bypass = parse_bool("AFFSYNC_IMAGE_CHECK_BYPASS", "false")?;
    let image_trusted_domains = parse_list(&or_default(
        "AFFSYNC_IMAGE_TRUSTED_DOMAINS",
        "cdn.shopify.com,images.cj.com",
    ));
    let image_max_retries = parse_u32("AFFSYNC_IMAGE_MAX_RETRIES", "2")?;
    let image_retry_delay_ms = parse_u64("AFFSYNC_IMAGE_RETRY_DELAY_MS", "500")?;
    let image_min_bytes = parse_u64("AFFSYNC_IMAGE_MIN_BYTES", "1000")?;

    let default_inventory_quantity = parse_i64("AFFSYNC_DEFAULT_INVENTORY_QUANTITY", "1")?;
    if default_inventory_quantity < 0 {
        return Err(invalid(
            "AFFSYNC_DEFAULT_INVENTORY_QUANTITY",
            "must be zero or greater".to_string(),
        ));
    }
    let request_timeout_secs = parse_u64("AFFSYNC_REQUEST_TIMEOUT_SECS", "30")?;
    let user_agent = or_default("AFFSYNC_USER_AGENT", "affsync/0.1 (catalog-sync)");
    let inter_request_delay_ms = parse_u64("AFFSYNC_INTER_REQUEST_DELAY_MS", "1500")?;
    let max_retries = parse_u32("AFFSYNC_MAX_RETRIES", "3")?;
    let retry_backoff_base_ms = parse_u64("AFFSYNC_RETRY_BACKOFF_BASE_MS", "1000")?;
    let max_concurrent_products = parse_usize("AFFSYNC_MAX_CONCURRENT_PRODUCTS", "4")?;
    if max_concurrent_products == 0 {
        return Err(invalid(
            "AFFSYNC_MAX_CONCURRENT_PRODUCTS",
            "must be at least 1".to_string(),
        ));
    }
    let dry_run = parse_bool("AFFSYNC_DRY_RUN", "false")?;
    let reconcile_cron = or_default("AFFSYNC_RECONCILE_CRON", "0 0 3 * * *");

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        brands_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        cj_api_url,
        cj_api_token,
        cj_company_id,
        cj_publisher_id,
        pepperjam_base_url,
        pepperjam_api_version,
        pepperjam_api_key,
        pepperjam_creative_id,
        shopify_store_url,
        shopify_access_token,
        shopify_api_version,
        shopify_location_id,
        shopify_webhook_secret,
        webhook_max_age_secs,
        webhook_dedup_ttl_secs,
        webhook_evict_interval_secs,
        image_check_bypass,
        image_trusted_domains,
        image_max_retries,
        image_retry_delay_ms,
        image_min_bytes,
        default_inventory_quantity,
        request_timeout_secs,
        user_agent,
        inter_request_delay_ms,
        max_retries,
        retry_backoff_base_ms,
        max_concurrent_products,
        dry_run,
        reconcile_cron,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` for unrecognized values.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "AFFSYNC_ENV".to_string(),
            reason: format!("expected development, test, or production; got '{other}'"),
        }),
    }
}

/// Split a comma-separated list, trimming entries and dropping blanks.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
