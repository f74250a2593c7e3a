//! Retry with jittered exponential backoff for feed requests.
//!
//! Only transient failures are retried: network errors and 5xx responses.
//! Rate limiting, malformed requests, and auth failures are returned on the
//! first occurrence.

use std::future::Future;
use std::time::Duration;

use crate::error::FeedError;

/// Upper bound on a single backoff sleep.
const MAX_BACKOFF_MS: u64 = 30_000;

fn is_retriable(err: &FeedError) -> bool {
    match err {
        FeedError::Http(_) => true,
        FeedError::UnexpectedStatus { status, .. } => *status >= 500,
        _ => false,
    }
}

/// Executes `operation`, retrying transient errors up to `max_retries` extra
/// times. The sleep before retry `n` is `backoff_base_ms * 2^n` scaled by a
/// random factor in `[0.75, 1.25]` and capped at [`MAX_BACKOFF_MS`].
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, FeedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FeedError>>,
{
    let mut attempt = 0u32;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !is_retriable(&err) || attempt >= max_retries {
            return Err(err);
        }

        let base = backoff_base_ms.saturating_mul(1u64 << attempt.min(20));
        let jitter = rand::random::<f64>() * 0.5 + 0.75;
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let delay_ms = ((base as f64 * jitter) as u64).min(MAX_BACKOFF_MS);

        tracing::warn!(
            attempt,
            max_retries,
            delay_ms,
            error = %err,
            "transient feed error, retrying after backoff"
        );
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        attempt += 1;
    }
}
