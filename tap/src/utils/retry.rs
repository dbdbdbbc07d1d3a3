use crate::utils::time::sleep_with_jitter;
use std::future::Future;
use tracing::warn;

/// Backoff stops growing here.
const MAX_DELAY_MS: u64 = 64_000;

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// `retries` extra attempts are spent. The delay doubles after each failure,
/// up to [`MAX_DELAY_MS`].
pub async fn retry_with_backoff<T, F, Fut>(
    mut retries: u32,
    base_delay_ms: u64,
    operation: F,
) -> common::Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = common::Result<T>>,
{
    let mut delay = base_delay_ms.min(MAX_DELAY_MS);

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if retries == 0 || !e.is_retryable() {
                    return Err(e);
                }

                warn!(error = %e, retries_left = retries, delay_ms = delay, "Retrying after transient error");
                retries -= 1;
                sleep_with_jitter(delay, delay / 2).await;
                delay = next_delay(delay);
            }
        }
    }
}

fn next_delay(delay: u64) -> u64 {
    delay.saturating_mul(2).min(MAX_DELAY_MS)
}
