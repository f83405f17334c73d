//! Retry logic for transient upstream failures
//!
//! Provides automatic retry with exponential backoff for cycle-scoped
//! requests such as instrument discovery. Per-instrument snapshot requests
//! are never retried.

use crate::error::TransportError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Upper bound on a single backoff sleep
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// `base * 2^(attempt-1)`, capped at `MAX_BACKOFF`
pub fn backoff_for(base_backoff: Duration, attempt: u32) -> Duration {
    let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
    base_backoff.saturating_mul(factor).min(MAX_BACKOFF)
}

/// Execute a request with automatic retry on transient failures
///
/// # Example
/// ```ignore
/// use collector_rust_core::retry::execute_with_retry;
///
/// let instruments = execute_with_retry(
///     || client.list_instruments(Currency::BTC, "option", false),
///     3, // max attempts
///     Duration::from_millis(500),
/// ).await?;
/// ```
pub async fn execute_with_retry<F, Fut, T>(
    mut f: F,
    max_attempts: u32,
    base_backoff: Duration,
) -> Result<T, TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < max_attempts && e.is_retriable() => {
                let backoff = backoff_for(base_backoff, attempt);
                warn!(
                    "Upstream request failed (attempt {}/{}): {}. Retrying in {}ms",
                    attempt,
                    max_attempts,
                    e,
                    backoff.as_millis()
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}
