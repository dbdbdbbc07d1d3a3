use rand::Rng;
use std::time::Duration;

/// Sleep for `base_ms` plus up to `jitter_ms` of random extra delay.
pub async fn sleep_with_jitter(base_ms: u64, jitter_ms: u64) {
    tokio::time::sleep(jittered(base_ms, jitter_ms)).await;
}

fn jittered(base_ms: u64, jitter_ms: u64) -> Duration {
    let extra = if jitter_ms == 0 {
        0
    } else {
        rand::rng().random_range(0..=jitter_ms)
    };
    Duration::from_millis(base_ms.saturating_add(extra))
}
