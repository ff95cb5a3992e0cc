//! Request router: the single entry point for orchestrated agent calls.
//!
//! ```text
//! route(request)
//!   → validate → bootstrap (once) → resolve intent → registry lookup
//!   → authorize → rate check
//!   → [run recorder] → retry → circuit breaker → handler
//!   → response + meta + metrics
//! ```
//!
//! Every branch ends in an [`OrchestratorResponse`]; nothing is raised to the
//! caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use relay_state::{OrchestratorStore, RunId, StorageError, TenantId};
use serde_json::{json, Map, Value};
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::Instrument;

use crate::config::OrchestratorConfig;
use crate::domain::{
    AgentId, ErrorCode, OrchestratorRequest, OrchestratorResponse, ResponseEnvelope, ResponseMeta,
};
use crate::intents::{IntentError, IntentResolver};
use crate::lifecycle::{execute_run, ExecutionContext, LifecycleError, RunOptions};
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::obs;
use crate::policy::{execute_guarded, CircuitBreaker, ExecutionError, RateLimiter, RetryPolicy};
use crate::registry::{AgentRegistry, RegistryEntry};

/// Failure of a one-time [`Bootstrap`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("bootstrap failed: {0}")]
pub struct BootstrapError(pub String);

impl From<anyhow::Error> for BootstrapError {
    fn from(err: anyhow::Error) -> Self {
        BootstrapError(format!("{err:#}"))
    }
}

/// One-time setup run before the first request is routed, typically
/// registering the built-in handlers.
///
/// A failed bootstrap is attempted again by the next request.
#[async_trait]
pub trait Bootstrap: Send + Sync {
    async fn bootstrap(&self, registry: &AgentRegistry) -> Result<(), BootstrapError>;
}

pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    store: Option<Arc<dyn OrchestratorStore>>,
    metrics: Arc<dyn MetricsSink>,
    resolver: IntentResolver,
    bootstrap: Option<Arc<dyn Bootstrap>>,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self {
            config: OrchestratorConfig::default(),
            store: None,
            metrics: Arc::new(NoopMetrics),
            resolver: IntentResolver::standard(),
            bootstrap: None,
        }
    }
}

impl OrchestratorBuilder {
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Durable store for agent and run records. Without one, every request
    /// runs untracked.
    pub fn store(mut self, store: Arc<dyn OrchestratorStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn resolver(mut self, resolver: IntentResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn bootstrap(mut self, bootstrap: Arc<dyn Bootstrap>) -> Self {
        self.bootstrap = Some(bootstrap);
        self
    }

    pub fn build(self) -> Orchestrator {
        Orchestrator {
            registry: AgentRegistry::new(),
            resolver: self.resolver,
            rate_limiter: RateLimiter::new(self.config.rate_limit.clone()),
            breaker: CircuitBreaker::new(self.config.circuit_breaker.clone(), self.metrics.clone()),
            retry: RetryPolicy::new(self.config.retry.clone()),
            metrics: self.metrics,
            store: self.store,
            bootstrap: self.bootstrap,
            bootstrapped: OnceCell::new(),
            config: self.config,
        }
    }
}

/// Owns the registry and all per-agent policy state.
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: AgentRegistry,
    resolver: IntentResolver,
    rate_limiter: RateLimiter,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    metrics: Arc<dyn MetricsSink>,
    store: Option<Arc<dyn OrchestratorStore>>,
    bootstrap: Option<Arc<dyn Bootstrap>>,
    bootstrapped: OnceCell<()>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("tracked", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

/// Why an admitted request produced no handler response.
enum ExecFailure {
    Execution(ExecutionError),
    Persistence(StorageError),
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn resolver(&self) -> &IntentResolver {
        &self.resolver
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Forget breaker and rate-limit state. Registrations are kept.
    pub fn reset(&self) {
        self.breaker.reset();
        self.rate_limiter.reset();
    }

    /// Route `request` and flatten the outcome into the wire envelope.
    pub async fn route_envelope(&self, request: &OrchestratorRequest) -> ResponseEnvelope {
        self.route(request).await.into_envelope()
    }

    /// Route one request to its agent.
    pub async fn route(&self, request: &OrchestratorRequest) -> OrchestratorResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        let span = obs::request_span(&request_id, &request.intent, request.provided_agent());
        self.route_inner(request).instrument(span).await
    }

    async fn route_inner(&self, request: &OrchestratorRequest) -> OrchestratorResponse {
        let intent = request.intent.trim();
        if intent.is_empty() {
            return reject(
                request,
                None,
                OrchestratorResponse::failure(ErrorCode::ValidationFailed, "intent is required"),
            );
        }

        if let Err(err) = self.ensure_bootstrapped().await {
            tracing::error!(error = %err, "orchestrator bootstrap failed");
            return reject(
                request,
                None,
                OrchestratorResponse::failure(ErrorCode::Unknown, err.to_string()),
            );
        }

        let agent = match self.resolver.resolve(intent, request.provided_agent()) {
            Ok(agent) => agent,
            Err(err) => {
                let mut response = OrchestratorResponse::failure(err.code(), err.to_string());
                if let Some(details) = err.details() {
                    response = response.with_details(details);
                }
                let expected = match &err {
                    IntentError::Mismatch { expected, .. } => Some(*expected),
                    _ => None,
                };
                return reject(request, expected, response);
            }
        };

        let Some(entry) = self.registry.get(agent) else {
            return reject(
                request,
                Some(agent),
                OrchestratorResponse::failure(
                    ErrorCode::AgentNotRegistered,
                    format!("agent '{agent}' is not registered"),
                ),
            );
        };

        let Some(caller_id) = request.context.caller_id() else {
            return reject(
                request,
                Some(agent),
                OrchestratorResponse::failure(
                    ErrorCode::Unauthenticated,
                    "userId is required in request context",
                ),
            );
        };

        if let Err(limited) = self.rate_limiter.check(agent, caller_id) {
            self.metrics.record_rate_limit_hit(agent.as_str(), caller_id);
            return reject(
                request,
                Some(agent),
                OrchestratorResponse::failure(ErrorCode::RateLimited, limited.to_string())
                    .with_details(json!({
                        "limit": limited.limit,
                        "retryAfterMs": limited.retry_after.as_millis() as u64,
                    })),
            );
        }

        self.execute(agent, &entry, request, caller_id).await
    }

    async fn ensure_bootstrapped(&self) -> Result<(), BootstrapError> {
        let Some(bootstrap) = &self.bootstrap else {
            return Ok(());
        };
        self.bootstrapped
            .get_or_try_init(|| async {
                bootstrap.bootstrap(&self.registry).await?;
                tracing::info!(agents = self.registry.len(), "orchestrator bootstrapped");
                Ok::<(), BootstrapError>(())
            })
            .await
            .map(|_| ())
    }

    async fn execute(
        &self,
        agent: AgentId,
        entry: &RegistryEntry,
        request: &OrchestratorRequest,
        caller_id: &str,
    ) -> OrchestratorResponse {
        let resolved = OrchestratorRequest {
            agent: Some(agent.as_str().to_string()),
            ..request.clone()
        };
        let handler = entry.handler.as_ref();
        let guarded = || execute_guarded(&self.retry, &self.breaker, agent, handler, &resolved);

        let started = Instant::now();
        let outcome = match (request.context.tenant_id(), &self.store) {
            (Some(tenant), Some(store)) => {
                let ctx = ExecutionContext {
                    tenant_id: Some(tenant.to_string()),
                    caller_id: Some(caller_id.to_string()),
                    agent_name: agent.as_str().to_string(),
                    intent: request.intent.clone(),
                };
                self.execute_tracked(store, agent, &ctx, &resolved.payload, guarded)
                    .await
            }
            (tenant, _) => {
                if tenant.is_none() {
                    obs::emit_untracked_execution(agent.as_str(), &request.intent);
                } else {
                    tracing::debug!(agent = %agent, "no run store configured, executing untracked");
                }
                guarded()
                    .await
                    .map(|response| (response, None))
                    .map_err(ExecFailure::Execution)
            }
        };
        let elapsed = started.elapsed();

        match outcome {
            Ok((response, run_id)) => self.finish(agent, request, response, run_id, elapsed),
            Err(failure) => self.fail(agent, request, failure),
        }
    }

    async fn execute_tracked<F, Fut>(
        &self,
        store: &Arc<dyn OrchestratorStore>,
        agent: AgentId,
        ctx: &ExecutionContext,
        input: &Value,
        guarded: F,
    ) -> Result<(OrchestratorResponse, Option<RunId>), ExecFailure>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<OrchestratorResponse, ExecutionError>>,
    {
        let tenant = ctx
            .tenant_id
            .as_deref()
            .map(TenantId::parse)
            .transpose()
            .map_err(ExecFailure::Persistence)?
            .ok_or_else(|| {
                ExecFailure::Persistence(StorageError::InvalidTenant {
                    reason: "organization id missing".to_string(),
                })
            })?;
        let record = store
            .ensure_agent(&tenant, agent.as_str())
            .await
            .map_err(ExecFailure::Persistence)?;

        let agent_name = agent.as_str();
        let intent = ctx.intent.clone();
        let options = RunOptions::default().with_metrics(move |response: &OrchestratorResponse| {
            let mut metrics = Map::new();
            metrics.insert("agent".to_string(), json!(agent_name));
            metrics.insert("intent".to_string(), json!(intent));
            metrics.insert("responseOk".to_string(), json!(response.is_success()));
            metrics
        });

        match execute_run(store.clone(), &record.agent_id, ctx, input, guarded, options).await {
            Ok(outcome) => Ok((outcome.result, Some(outcome.run_id))),
            Err(LifecycleError::Execution(err)) => Err(ExecFailure::Execution(err)),
            Err(LifecycleError::Storage(err)) => Err(ExecFailure::Persistence(err)),
            Err(LifecycleError::MissingTenant) => {
                Err(ExecFailure::Persistence(StorageError::InvalidTenant {
                    reason: "organization id missing".to_string(),
                }))
            }
        }
    }

    fn finish(
        &self,
        agent: AgentId,
        request: &OrchestratorRequest,
        response: OrchestratorResponse,
        run_id: Option<RunId>,
        elapsed: Duration,
    ) -> OrchestratorResponse {
        let duration_seconds = elapsed.as_secs_f64();
        let response_ok = response.is_success();
        let status = if response_ok { "success" } else { "failed" };
        self.metrics
            .record_agent_run(agent.as_str(), status, elapsed, &request.intent);

        let run_id = run_id.map(|id| id.0);
        obs::emit_run_completed(
            agent.as_str(),
            &request.intent,
            run_id.as_deref(),
            duration_seconds,
            response_ok,
        );
        if let Some(error) = response.error() {
            tracing::warn!(
                agent = %agent,
                intent = %request.intent,
                code = %error.code,
                message = %error.message,
                "agent responded with error"
            );
        }

        let mut meta =
            base_meta(request, Some(agent)).with_metric("durationSeconds", duration_seconds);
        meta.run_id = run_id;
        response.merge_meta(meta)
    }

    fn fail(
        &self,
        agent: AgentId,
        request: &OrchestratorRequest,
        failure: ExecFailure,
    ) -> OrchestratorResponse {
        let response = match failure {
            ExecFailure::Execution(
                err @ ExecutionError::CircuitOpen {
                    failure_count,
                    retry_after,
                    ..
                },
            ) => {
                obs::emit_run_failed(
                    agent.as_str(),
                    &request.intent,
                    ErrorCode::CircuitOpen.as_str(),
                    &err,
                );
                self.metrics.record_circuit_breaker_failure(agent.as_str());
                OrchestratorResponse::failure(ErrorCode::CircuitOpen, err.to_string()).with_details(
                    json!({
                        "failureCount": failure_count,
                        "retryAfterMs": retry_after.as_millis() as u64,
                    }),
                )
            }
            ExecFailure::Execution(ExecutionError::Fault(fault)) => {
                obs::emit_run_failed(
                    agent.as_str(),
                    &request.intent,
                    ErrorCode::AgentExecutionFailed.as_str(),
                    &fault,
                );
                self.metrics
                    .record_agent_run(agent.as_str(), "failed", Duration::ZERO, &request.intent);
                OrchestratorResponse::failure(
                    ErrorCode::AgentExecutionFailed,
                    "agent execution failed",
                )
                .with_details(json!({ "message": fault.message() }))
            }
            ExecFailure::Persistence(err) => {
                obs::emit_run_failed(
                    agent.as_str(),
                    &request.intent,
                    ErrorCode::AgentExecutionFailed.as_str(),
                    &err,
                );
                self.metrics
                    .record_agent_run(agent.as_str(), "failed", Duration::ZERO, &request.intent);
                OrchestratorResponse::failure(
                    ErrorCode::AgentExecutionFailed,
                    "agent execution failed",
                )
                .with_details(json!({ "message": err.to_string(), "stage": "persistence" }))
            }
        };
        response.merge_meta(base_meta(request, Some(agent)))
    }
}

fn base_meta(request: &OrchestratorRequest, agent: Option<AgentId>) -> ResponseMeta {
    let mut meta = ResponseMeta::default().with_intent(request.intent.clone());
    meta.agent = agent
        .map(|a| a.as_str().to_string())
        .or_else(|| request.provided_agent().map(str::to_string));
    meta
}

fn reject(
    request: &OrchestratorRequest,
    agent: Option<AgentId>,
    response: OrchestratorResponse,
) -> OrchestratorResponse {
    let meta = base_meta(request, agent);
    if let Some(error) = response.error() {
        obs::emit_request_rejected(
            &request.intent,
            meta.agent.as_deref(),
            error.code.as_str(),
            &error.message,
        );
    }
    response.merge_meta(meta)
}
