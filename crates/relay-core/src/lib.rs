//! Relay Core Library
//!
//! Routes logical agent requests ("run agent X with intent Y") to registered
//! handlers, guarding each call with authorization, rate limits, retries and
//! a circuit breaker, and recording tracked runs in a durable store.

pub mod config;
pub mod domain;
pub mod intents;
pub mod lifecycle;
pub mod metrics;
pub mod obs;
pub mod policy;
pub mod registry;
pub mod router;
pub mod run_context;
pub mod telemetry;
pub mod tooling;

pub use config::OrchestratorConfig;

pub use domain::{
    handler_fn, AgentHandler, AgentId, EnvelopeStatus, ErrorBody, ErrorCode, OrchestratorRequest,
    OrchestratorResponse, RelayError, RequestContext, ResponseEnvelope, ResponseMeta, Result,
};

pub use intents::{IntentError, IntentResolver, STANDARD_INTENTS};

pub use lifecycle::{execute_run, ExecutionContext, LifecycleError, RunOptions, RunOutcome};

pub use metrics::{MetricsSink, MetricsSnapshot, NoopMetrics, OrchestratorMetrics};

pub use policy::{
    AgentFault, BreakerState, CircuitBreaker, CircuitBreakerConfig, ExecutionError,
    RateLimitConfig, RateLimited, RateLimiter, RetryConfig, RetryPolicy,
};

pub use registry::{AgentRegistry, RegistrationMeta, RegistryEntry};

pub use router::{Bootstrap, BootstrapError, Orchestrator, OrchestratorBuilder};

pub use run_context::RunContext;

pub use telemetry::init_tracing;

pub use tooling::{execute_tool, ToolCallStatus, ToolExecutionReport, ToolTelemetry};

pub use relay_state::{RunId, RunRecord, RunStatus, TenantId};
