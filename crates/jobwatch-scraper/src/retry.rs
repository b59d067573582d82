//! Retry utilities for listing-page fetches.
//!
//! Transient failures (429, 5xx, network errors) are retried with capped
//! exponential backoff and jitter. Everything else (4xx, undecodable bodies,
//! missing item arrays) is returned immediately.

use std::future::Future;
use std::time::Duration;

use crate::error::ExtractError;

const MAX_DELAY_SECS: u64 = 60;

/// Returns `true` if `err` is a transient condition worth retrying.
fn is_retriable(err: &ExtractError) -> bool {
    match err {
        ExtractError::RateLimited { .. } | ExtractError::Http(_) => true,
        ExtractError::UnexpectedStatus { status, .. } => *status >= 500,
        ExtractError::Deserialize { .. } | ExtractError::MissingItems { .. } => false,
    }
}

/// Executes `operation`, retrying transient errors up to `max_retries` times.
///
/// The wait before retry `n` is `backoff_base_secs * 2^(n-1)` seconds, capped
/// at 60 s and scaled by ±25 % jitter. With `max_retries = 2` the operation
/// runs at most three times. When retries are exhausted the last error is
/// returned.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_secs: u64,
    mut operation: F,
) -> Result<T, ExtractError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ExtractError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let computed_ms = backoff_base_secs
                    .saturating_mul(1000)
                    .saturating_mul(1u64 << (attempt - 1).min(10));
                let capped_ms = computed_ms.min(MAX_DELAY_SECS * 1000);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped_ms as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "transient fetch error, retrying after backoff"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}
