use backon::{ConstantBuilder, Retryable};
use std::fmt::Display;
use std::future::Future;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::{HarnessError, ReadinessConfig};

/// Poll the daemon's control endpoint until one connection attempt succeeds.
///
/// `attempt_connection` is whatever round trip the caller considers proof of
/// readiness; its success value is returned as-is and every failure is
/// treated as "not reachable yet". The budget is
/// `ceil(timeout / poll_interval)` attempts at a fixed interval, so the
/// total wait never exceeds the timeout by more than one interval and a
/// success returns immediately instead of waiting out the budget. When the
/// budget runs out, [`HarnessError::ReadinessTimeout`] reports the
/// configured timeout.
pub async fn wait_until_ready<T, E, F, Fut>(
    config: &ReadinessConfig,
    attempt_connection: F,
) -> Result<T, HarnessError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    config.validate()?;
    let max_attempts = config.max_attempts();
    let backoff = ConstantBuilder::default()
        .with_delay(config.poll_interval())
        .with_max_times(max_attempts.saturating_sub(1) as usize);

    let started = Instant::now();
    let result = attempt_connection
        .retry(backoff)
        .notify(|error: &E, retry_in| {
            debug!(%error, ?retry_in, "control endpoint not reachable yet");
        })
        .await;

    match result {
        Ok(value) => {
            info!(waited = ?started.elapsed(), "control endpoint reachable");
            Ok(value)
        }
        Err(error) => {
            warn!(
                %error,
                attempts = max_attempts,
                "control endpoint never became reachable"
            );
            Err(HarnessError::ReadinessTimeout {
                timeout: config.timeout(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn config(timeout_ms: u64, poll_interval_ms: u64) -> ReadinessConfig {
        ReadinessConfig {
            timeout_ms,
            poll_interval_ms,
        }
    }

    #[tokio::test]
    async fn test_attempt_budget_exhaustion() {
        let attempts = AtomicUsize::new(0);
        let started = Instant::now();
        let result: Result<(), _> = wait_until_ready(&config(220, 50), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("connection refused") }
        })
        .await;
        let error = result.expect_err("no attempt can succeed");
        assert!(matches!(
            error,
            HarnessError::ReadinessTimeout { timeout } if timeout == Duration::from_millis(220)
        ));
        // ceil(220 / 50) attempts, no more.
        assert_eq!(attempts.load(Ordering::SeqCst), 5);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_success_on_kth_attempt() {
        let attempts = AtomicUsize::new(0);
        let value = wait_until_ready(&config(3_000, 50), || {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n >= 3 {
                    Ok(n)
                } else {
                    Err("not yet listening")
                }
            }
        })
        .await
        .expect("third attempt succeeds");
        assert_eq!(value, 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let started = Instant::now();
        let value = wait_until_ready(&config(3_000, 500), || async { Ok::<_, &str>("ready") })
            .await
            .expect("immediate success");
        assert_eq!(value, "ready");
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_invalid_config_rejection() {
        let attempts = AtomicUsize::new(0);
        let result: Result<(), _> = wait_until_ready(&config(0, 100), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("unused") }
        })
        .await;
        assert!(matches!(result, Err(HarnessError::Config(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ragged_budget_rounding() {
        let attempts = AtomicUsize::new(0);
        let result: Result<(), _> = wait_until_ready(&config(101, 100), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("refused") }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
