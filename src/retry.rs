use crate::types::{PipelineError, Result, RetryConfig};
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Single reusable retry policy for all external-collaborator calls.
/// Only transient errors are retried; everything else surfaces immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub async fn run<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.initial_delay_seconds),
            initial_interval: Duration::from_secs(self.config.initial_delay_seconds),
            max_interval: Duration::from_secs(self.config.max_delay_seconds),
            multiplier: self.config.multiplier,
            max_elapsed_time: None,
            ..Default::default()
        };

        let mut last_error = None;
        for attempt in 1..=self.config.max_attempts {
            match f().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < self.config.max_attempts => {
                    let delay = backoff
                        .next_backoff()
                        .unwrap_or(Duration::from_secs(self.config.initial_delay_seconds));
                    warn!(
                        "Attempt {} of '{}' failed ({}), retrying in {:?}",
                        attempt, operation, error, delay
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(error);
                }
                Err(error) => return Err(error),
            }
        }

        Err(last_error
            .unwrap_or_else(|| PipelineError::General(format!("operation '{operation}' failed"))))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

/// Mandatory per-call timeout for external work. Elapsing is treated
/// identically to a collaborator error.
pub async fn call_with_timeout<T, Fut>(operation: &str, seconds: u64, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(Duration::from_secs(seconds), fut).await {
        Ok(result) => result,
        Err(_) => Err(PipelineError::CollaboratorTimeout {
            operation: operation.to_string(),
            seconds,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts: 3,
            initial_delay_seconds: 0,
            max_delay_seconds: 0,
            multiplier: 1.0,
        })
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let result = fast_policy()
            .run("flaky", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(PipelineError::CollaboratorUnavailable {
                        operation: "flaky".to_string(),
                        reason: "transient".to_string(),
                    })
                } else {
                    Ok(42)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast_policy()
            .run("restricted", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(PipelineError::RestrictedContent {
                    reason: "region blocked".to_string(),
                })
            })
            .await;
        assert!(matches!(result, Err(PipelineError::RestrictedContent { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_the_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast_policy()
            .run("down", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(PipelineError::CollaboratorUnavailable {
                    operation: "down".to_string(),
                    reason: "always".to_string(),
                })
            })
            .await;
        assert!(matches!(result, Err(PipelineError::CollaboratorUnavailable { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let result: Result<()> = call_with_timeout("slow", 0, async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(PipelineError::CollaboratorTimeout { .. })));
    }
}
