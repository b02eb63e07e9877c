use std::fmt::Display;
use std::time::Duration;
use tracing::warn;

/// Retry an async operation with linear backoff.
///
/// Calls `f` up to `max_attempts` times. On failure, waits `base_delay * attempt`
/// before retrying. Returns the first successful result, or the last error.
pub async fn retry_with_backoff<F, Fut, T, E>(
    max_attempts: u32,
    base_delay: Duration,
    label: &str,
    f: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: Display,
{
    let mut last_err = None;
    for attempt in 1..=max_attempts {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if attempt < max_attempts {
                    warn!(
                        "{} failed (attempt {}/{}): {}",
                        label, attempt, max_attempts, e
                    );
                    tokio::time::sleep(base_delay * attempt).await;
                }
                last_err = Some(e);
            }
        }
    }

    warn!("{} failed after {} attempts", label, max_attempts);
    Err(last_err.unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> =
            retry_with_backoff(3, Duration::from_millis(10), "test op", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(format!("transient {}", n))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_last_error_when_exhausted() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> =
            retry_with_backoff(2, Duration::from_millis(10), "test op", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(format!("failure {}", n))
            })
            .await;
        assert_eq!(result.unwrap_err(), "failure 2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
