//! Shared retry-with-linear-backoff helper used by every HTTP adapter (§7).
//!
//! Grounded in the corpus's `backoff` crate usage for resilient upstream
//! calls; the teacher has no retry helper of its own so this is a new
//! dependency pulled in from the rest of the pack (see `DESIGN.md`).

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::future::Future;
use std::time::Duration;

/// Runs `op` up to `max_attempts` times with linear back-off (§7:
/// `TransientUpstream` is "retried twice with back-off"), returning the first
/// `Ok` or the last `Err`. `op` is expected to return a retryable error for
/// transient failures; callers decide what counts as retryable by mapping
/// non-retryable failures to an immediate early return inside the closure.
pub async fn with_backoff<T, E, F, Fut>(max_attempts: u32, initial_interval: Duration, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut backoff = ExponentialBackoff {
        initial_interval,
        multiplier: 1.0, // linear back-off per §7, not exponential
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    };

    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= max_attempts {
                    return Err(err);
                }
                let wait = backoff.next_backoff().unwrap_or(initial_interval);
                tokio::time::sleep(wait).await;
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, &str> = with_backoff(3, Duration::from_millis(1), || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("transient")
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let result: Result<u32, &str> =
            with_backoff(2, Duration::from_millis(1), || async { Err("still failing") }).await;
        assert_eq!(result, Err("still failing"));
    }
}
