//! Execution policies: rate limiting, circuit breaking and retry.
//!
//! Composition at the call site is `Retry ∘ CircuitBreaker ∘ handler`; see
//! [`execute_guarded`].

pub mod circuit_breaker;
pub mod error;
pub mod rate_limit;
pub mod retry;

pub use circuit_breaker::{BreakerState, CircuitBreaker, CircuitBreakerConfig};
pub use error::{error_chain, AgentFault, ExecutionError, ExecutionResult};
pub use rate_limit::{RateLimitConfig, RateLimited, RateLimiter};
pub use retry::{RetryConfig, RetryPolicy};

use crate::domain::{AgentHandler, AgentId, OrchestratorRequest, OrchestratorResponse};

/// Invoke `handler` for `request` with retry wrapped around the breaker.
pub async fn execute_guarded(
    retry: &RetryPolicy,
    breaker: &CircuitBreaker,
    agent: AgentId,
    handler: &dyn AgentHandler,
    request: &OrchestratorRequest,
) -> ExecutionResult<OrchestratorResponse> {
    retry
        .run(agent, move |_attempt| {
            breaker.call(agent, move || handler.handle(request))
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::handler_fn;
    use crate::metrics::NoopMetrics;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn breaker_failures_accumulate_across_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let handler = handler_fn(move |_req| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<OrchestratorResponse, _>(AgentFault::new("model unavailable"))
            }
        });

        let retry = RetryPolicy::default();
        let breaker = CircuitBreaker::new(CircuitBreakerConfig::default(), Arc::new(NoopMetrics));
        let request = OrchestratorRequest::new("summarize");

        let err = execute_guarded(&retry, &breaker, AgentId::Content, &handler, &request)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "model unavailable");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(breaker.state(AgentId::Content), BreakerState::Open);

        let err = execute_guarded(&retry, &breaker, AgentId::Content, &handler, &request)
            .await
            .unwrap_err();
        assert!(err.is_circuit_open());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
