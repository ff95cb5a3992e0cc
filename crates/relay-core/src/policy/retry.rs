//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::ExecutionError;
use crate::domain::AgentId;
use crate::obs;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each further failure (milliseconds).
    pub base_delay_ms: u64,
    /// Keep retrying when the circuit breaker rejects the call.
    pub retry_open_circuit: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 75,
            retry_open_circuit: false,
        }
    }
}

impl RetryConfig {
    /// Backoff after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    fn should_retry(&self, attempt: u32, err: &ExecutionError) -> bool {
        if attempt >= self.config.max_attempts.max(1) {
            return false;
        }
        !err.is_circuit_open() || self.config.retry_open_circuit
    }

    /// Run `op` until it succeeds or attempts are exhausted.
    ///
    /// `op` receives the 1-based attempt number. The last error is returned
    /// unchanged.
    pub async fn run<T, F, Fut>(&self, agent: AgentId, mut op: F) -> Result<T, ExecutionError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ExecutionError>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if self.should_retry(attempt, &err) => {
                    let delay = self.config.delay_for(attempt);
                    obs::emit_retry_scheduled(agent.as_str(), attempt, delay, &err);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::AgentFault;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn policy(max_attempts: u32, base_delay_ms: u64, retry_open_circuit: bool) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts,
            base_delay_ms,
            retry_open_circuit,
        })
    }

    fn open_circuit() -> ExecutionError {
        ExecutionError::CircuitOpen {
            agent: AgentId::Content,
            failure_count: 3,
            retry_after: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_retry_config_default() {
        let cfg = RetryConfig::default();
        assert_eq!(cfg.max_attempts, 3);
        assert_eq!(cfg.base_delay_ms, 75);
        assert!(!cfg.retry_open_circuit);
    }

    #[test]
    fn test_backoff_doubles() {
        let cfg = RetryConfig::default();
        assert_eq!(cfg.delay_for(1), Duration::from_millis(75));
        assert_eq!(cfg.delay_for(2), Duration::from_millis(150));
        assert_eq!(cfg.delay_for(3), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_once_then_succeed() {
        let calls = &AtomicU32::new(0);
        let started = Instant::now();

        let value = policy(3, 75, false)
            .run(AgentId::Content, move |_| async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ExecutionError::from(AgentFault::new("transient")))
                } else {
                    Ok("done")
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(75) && elapsed < Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_attempts_and_returns_last_error() {
        let started = Instant::now();
        let err = policy(3, 10, false)
            .run(AgentId::Seo, |attempt| async move {
                Err::<(), _>(ExecutionError::from(AgentFault::new(format!(
                    "attempt {attempt}"
                ))))
            })
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "attempt 3");
        // 10ms + 20ms of backoff
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(30) && elapsed < Duration::from_millis(70));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_short_circuits_by_default() {
        let calls = &AtomicU32::new(0);
        let err = policy(3, 75, false)
            .run(AgentId::Content, move |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(open_circuit())
            })
            .await
            .unwrap_err();

        assert!(err.is_circuit_open());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_retried_when_enabled() {
        let calls = &AtomicU32::new(0);
        let err = policy(3, 75, true)
            .run(AgentId::Content, move |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(open_circuit())
            })
            .await
            .unwrap_err();

        assert!(err.is_circuit_open());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_runs_once() {
        let calls = &AtomicU32::new(0);
        let _ = policy(0, 75, false)
            .run(AgentId::Email, move |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ExecutionError::from(AgentFault::new("x")))
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
