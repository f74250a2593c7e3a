//! Retry for Admin API calls.
//!
//! Shopify's leaky-bucket limiter answers 429 with a `Retry-After`; those are
//! retried after the advertised wait. Transport failures and 5xx responses
//! use exponential backoff. Everything else is returned immediately.

use std::future::Future;
use std::time::Duration;

use affsync_core::CatalogError;

const MAX_BACKOFF_MS: u64 = 30_000;

fn retry_delay_ms(err: &CatalogError, attempt: u32, backoff_base_ms: u64) -> Option<u64> {
    let backoff = backoff_base_ms.saturating_mul(1u64 << attempt.min(20));
    match err {
        CatalogError::RateLimited { retry_after_secs } => {
            Some(retry_after_secs.saturating_mul(1_000).max(backoff))
        }
        CatalogError::Transport(_) => Some(backoff),
        CatalogError::UnexpectedStatus { status, .. } if *status >= 500 => Some(backoff),
        _ => None,
    }
}

pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, CatalogError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CatalogError>>,
{
    let mut attempt = 0u32;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let Some(delay_ms) = retry_delay_ms(&err, attempt, backoff_base_ms) else {
            return Err(err);
        };
        if attempt >= max_retries {
            return Err(err);
        }

        let jitter = rand::random::<f64>() * 0.5 + 0.75;
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let delay_ms = ((delay_ms as f64 * jitter) as u64).min(MAX_BACKOFF_MS);

        tracing::warn!(
            attempt,
            max_retries,
            delay_ms,
            error = %err,
            "transient Shopify error, retrying"
        );
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_never_retried() {
        let err = CatalogError::NotFound {
            resource: "product",
            id: "1".into(),
        };
        assert_eq!(retry_delay_ms(&err, 0, 100), None);
    }

    #[test]
    fn rate_limit_waits_at_least_retry_after() {
        let err = CatalogError::RateLimited {
            retry_after_secs: 2,
        };
        assert_eq!(retry_delay_ms(&err, 0, 100), Some(2_000));
    }

    #[test]
    fn server_errors_back_off_exponentially() {
        let err = CatalogError::UnexpectedStatus {
            status: 502,
            context: "x".into(),
        };
        assert_eq!(retry_delay_ms(&err, 2, 100), Some(400));
        let client_err = CatalogError::UnexpectedStatus {
            status: 418,
            context: "x".into(),
        };
        assert_eq!(retry_delay_ms(&client_err, 0, 100), None);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let mut calls = 0u32;
        let result: Result<(), _> = retry_with_backoff(2, 0, || {
            calls += 1;
            async { Err(CatalogError::Transport("reset".into())) }
        })
        .await;
        assert!(matches!(result, Err(CatalogError::Transport(_))));
        assert_eq!(calls, 3);
    }
}
