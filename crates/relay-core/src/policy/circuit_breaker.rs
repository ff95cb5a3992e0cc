//! Per-agent circuit breaker with cooldown.
//!
//! Closed until `failure_threshold` consecutive faults; then Open until
//! `cooldown` has elapsed since the last fault. The first call after the
//! cooldown is let through: success closes the breaker, failure re-opens it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::error::{AgentFault, ExecutionError};
use crate::domain::AgentId;
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::obs;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// How long the breaker stays open after the last failure (milliseconds).
    pub cooldown_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_ms: 10_000,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
}

#[derive(Debug, Clone, Copy)]
struct CircuitState {
    failure_count: u32,
    last_failure_at: Instant,
}

/// Breaker state for every agent, shared by all callers in the process.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    states: Mutex<HashMap<AgentId, CircuitState>>,
    metrics: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("states", &self.states)
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            config,
            states: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn states(&self) -> MutexGuard<'_, HashMap<AgentId, CircuitState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_for(&self, state: &CircuitState, now: Instant) -> Option<Duration> {
        if state.failure_count < self.config.failure_threshold {
            return None;
        }
        let elapsed = now.saturating_duration_since(state.last_failure_at);
        self.config.cooldown().checked_sub(elapsed).filter(|d| !d.is_zero())
    }

    /// Current state for `agent`.
    pub fn state(&self, agent: AgentId) -> BreakerState {
        let now = Instant::now();
        match self.states().get(&agent) {
            Some(state) if self.open_for(state, now).is_some() => BreakerState::Open,
            _ => BreakerState::Closed,
        }
    }

    /// Consecutive failures recorded for `agent`.
    pub fn failure_count(&self, agent: AgentId) -> u32 {
        self.states()
            .get(&agent)
            .map(|s| s.failure_count)
            .unwrap_or(0)
    }

    /// Reject with `CircuitOpen` if the breaker for `agent` is open.
    pub fn check(&self, agent: AgentId) -> Result<(), ExecutionError> {
        let now = Instant::now();
        let rejection = self.states().get(&agent).and_then(|state| {
            self.open_for(state, now)
                .map(|retry_after| (state.failure_count, retry_after))
        });

        match rejection {
            Some((failure_count, retry_after)) => {
                obs::emit_circuit_rejected(agent.as_str(), failure_count, retry_after);
                Err(ExecutionError::CircuitOpen {
                    agent,
                    failure_count,
                    retry_after,
                })
            }
            None => Ok(()),
        }
    }

    /// Reset the failure count on success.
    pub fn record_success(&self, agent: AgentId) {
        let previous = self.states().remove(&agent);
        if let Some(state) = previous {
            if state.failure_count >= self.config.failure_threshold {
                self.metrics.set_circuit_state(agent.as_str(), false);
            }
        }
    }

    /// Record a failure. Returns the consecutive failure count.
    pub fn record_failure(&self, agent: AgentId) -> u32 {
        let now = Instant::now();
        let failure_count = {
            let mut states = self.states();
            let state = states.entry(agent).or_insert(CircuitState {
                failure_count: 0,
                last_failure_at: now,
            });
            state.failure_count = state.failure_count.saturating_add(1);
            state.last_failure_at = now;
            state.failure_count
        };

        if failure_count >= self.config.failure_threshold {
            obs::emit_circuit_opened(agent.as_str(), failure_count, self.config.cooldown_ms);
            self.metrics.set_circuit_state(agent.as_str(), true);
        }
        failure_count
    }

    /// Run `op` under the breaker for `agent`.
    ///
    /// While open, `op` is not invoked at all.
    pub async fn call<T, F, Fut>(&self, agent: AgentId, op: F) -> Result<T, ExecutionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AgentFault>>,
    {
        self.check(agent)?;
        match op().await {
            Ok(value) => {
                self.record_success(agent);
                Ok(value)
            }
            Err(fault) => {
                self.record_failure(agent);
                Err(ExecutionError::Fault(fault))
            }
        }
    }

    /// Forget all breaker state.
    pub fn reset(&self) {
        self.states().clear();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default(), Arc::new(NoopMetrics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn breaker(threshold: u32, cooldown_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            CircuitBreakerConfig {
                failure_threshold: threshold,
                cooldown_ms,
            },
            Arc::new(NoopMetrics),
        )
    }

    async fn fail(cb: &CircuitBreaker, agent: AgentId) -> ExecutionError {
        cb.call(agent, || async { Err::<(), _>(AgentFault::new("boom")) })
            .await
            .unwrap_err()
    }

    #[test]
    fn test_circuit_breaker_config_default() {
        let cfg = CircuitBreakerConfig::default();
        assert_eq!(cfg.failure_threshold, 3);
        assert_eq!(cfg.cooldown_ms, 10_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_starts_closed() {
        let cb = breaker(3, 1_000);
        assert_eq!(cb.state(AgentId::Content), BreakerState::Closed);
        assert_eq!(cb.failure_count(AgentId::Content), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_opens_at_threshold() {
        let cb = breaker(3, 1_000);
        cb.record_failure(AgentId::Content);
        cb.record_failure(AgentId::Content);
        assert_eq!(cb.state(AgentId::Content), BreakerState::Closed);
        cb.record_failure(AgentId::Content);
        assert_eq!(cb.state(AgentId::Content), BreakerState::Open);
        assert_eq!(cb.state(AgentId::Seo), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_resets_on_success() {
        let cb = breaker(3, 1_000);
        cb.record_failure(AgentId::Email);
        cb.record_failure(AgentId::Email);
        cb.record_success(AgentId::Email);
        assert_eq!(cb.failure_count(AgentId::Email), 0);
        cb.record_failure(AgentId::Email);
        assert_eq!(cb.state(AgentId::Email), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_does_not_invoke_op() {
        let cb = breaker(2, 1_000);
        fail(&cb, AgentId::Social).await;
        fail(&cb, AgentId::Social).await;

        let calls = &AtomicU32::new(0);
        let err = cb
            .call(AgentId::Social, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, AgentFault>(())
            })
            .await
            .unwrap_err();

        assert!(err.is_circuit_open());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        match err {
            ExecutionError::CircuitOpen {
                failure_count,
                retry_after,
                ..
            } => {
                assert_eq!(failure_count, 2);
                assert_eq!(retry_after, Duration::from_millis(1_000));
            }
            other => panic!("expected CircuitOpen, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_after_cooldown() {
        let cb = breaker(2, 1_000);
        fail(&cb, AgentId::Support).await;
        fail(&cb, AgentId::Support).await;

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(fail(&cb, AgentId::Support).await.is_circuit_open());

        tokio::time::advance(Duration::from_millis(1)).await;
        // Probe fails: breaker re-opens for a full cooldown.
        assert!(!fail(&cb, AgentId::Support).await.is_circuit_open());
        assert_eq!(cb.state(AgentId::Support), BreakerState::Open);

        tokio::time::advance(Duration::from_millis(1_000)).await;
        cb.call(AgentId::Support, || async { Ok::<_, AgentFault>(()) })
            .await
            .unwrap();
        assert_eq!(cb.state(AgentId::Support), BreakerState::Closed);
        assert_eq!(cb.failure_count(AgentId::Support), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_closes_everything() {
        let cb = breaker(1, 60_000);
        fail(&cb, AgentId::Campaign).await;
        assert_eq!(cb.state(AgentId::Campaign), BreakerState::Open);
        cb.reset();
        assert_eq!(cb.state(AgentId::Campaign), BreakerState::Closed);
    }
}
