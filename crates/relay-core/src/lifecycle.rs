//! Run lifecycle recorder: wraps one execution in a durable run record.
//!
//! Usage:
//! 1. Build an [`ExecutionContext`] with the tenant, caller and intent.
//! 2. Call [`execute_run`] with an executor closure.
//! 3. The record is opened as `running`, the executor runs with a
//!    [`RunContext`] bound, and the record is closed as `success` or `failed`.
//!
//! Executor errors are always returned to the caller unchanged.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use relay_state::{NewRun, OrchestratorStore, RunId, StorageError, TenantId};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::time::Instant;
use tracing::Instrument;

use crate::metrics::MetricsSink;
use crate::obs;
use crate::policy::error_chain;
use crate::run_context::{self, RunContext};

/// Key used in place of a value that failed to serialize.
pub const SERIALIZATION_ERROR_KEY: &str = "__serialization_error";

/// Who is running what, on behalf of which tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    pub tenant_id: Option<String>,
    pub caller_id: Option<String>,
    pub agent_name: String,
    pub intent: String,
}

type MetricsBuilder<T> = Box<dyn Fn(&T) -> Map<String, Value> + Send + Sync>;

/// Optional hooks for [`execute_run`].
pub struct RunOptions<T> {
    build_metrics: Option<MetricsBuilder<T>>,
    sink: Option<Arc<dyn MetricsSink>>,
}

impl<T> Default for RunOptions<T> {
    fn default() -> Self {
        Self {
            build_metrics: None,
            sink: None,
        }
    }
}

impl<T> RunOptions<T> {
    /// Derive extra metrics from a successful result.
    pub fn with_metrics<F>(mut self, build: F) -> Self
    where
        F: Fn(&T) -> Map<String, Value> + Send + Sync + 'static,
    {
        self.build_metrics = Some(Box::new(build));
        self
    }

    /// Report the finished run to `sink` as well.
    ///
    /// Off by default: the router records its own run metric.
    pub fn record_to(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = Some(sink);
        self
    }
}

/// A finished, successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome<T> {
    pub run_id: RunId,
    pub result: T,
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError<E> {
    /// No tenant id: the caller should have run the executor untracked.
    #[error("organization id is required to track an agent run")]
    MissingTenant,

    /// The run record could not be opened or closed.
    #[error("failed to record agent run: {0}")]
    Storage(#[from] StorageError),

    /// The executor failed; the run was recorded as failed.
    #[error(transparent)]
    Execution(E),
}

/// Serialize `value`, substituting a sentinel object if that fails.
pub fn serialize_or_sentinel<V: Serialize + ?Sized>(value: &V) -> Value {
    serde_json::to_value(value)
        .unwrap_or_else(|e| json!({ SERIALIZATION_ERROR_KEY: e.to_string() }))
}

fn insert_error(metrics: &mut Map<String, Value>, err: &(dyn std::error::Error + 'static)) {
    metrics.insert("error".to_string(), Value::String(err.to_string()));
    metrics.insert(
        "stack".to_string(),
        Value::String(error_chain(err).join("\n  caused by: ")),
    );
}

/// Close the run as failed. A store error here is logged, never returned.
async fn record_failure(
    store: &dyn OrchestratorStore,
    run_id: &RunId,
    metrics: Map<String, Value>,
    completed_at: chrono::DateTime<Utc>,
) {
    if let Err(store_err) = store
        .fail_run(run_id, Value::Object(metrics), completed_at)
        .await
    {
        obs::emit_run_finalize_error(&run_id.0, &store_err);
    }
}

fn baseline_metrics(ctx: &ExecutionContext) -> Map<String, Value> {
    let mut metrics = Map::new();
    metrics.insert("intent".to_string(), Value::String(ctx.intent.clone()));
    metrics.insert(
        "callerId".to_string(),
        ctx.caller_id.clone().map(Value::String).unwrap_or(Value::Null),
    );
    metrics
}

/// Execute `executor` inside a tracked run.
///
/// Opens a `running` record for `agent_id` (the durable agent record id),
/// binds a [`RunContext`] for the executor, then records the outcome.
pub async fn execute_run<I, T, E, F, Fut>(
    store: Arc<dyn OrchestratorStore>,
    agent_id: &str,
    ctx: &ExecutionContext,
    input: &I,
    executor: F,
    options: RunOptions<T>,
) -> Result<RunOutcome<T>, LifecycleError<E>>
where
    I: Serialize + ?Sized,
    T: Serialize,
    E: std::error::Error + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let tenant = ctx
        .tenant_id
        .as_deref()
        .and_then(|t| TenantId::parse(t).ok())
        .ok_or(LifecycleError::MissingTenant)?;

    let started_at = Utc::now();
    let clock = Instant::now();
    let record = store
        .create_run(NewRun {
            agent_id: agent_id.to_string(),
            tenant_id: tenant.clone(),
            input: serialize_or_sentinel(input),
            metrics: Value::Object(baseline_metrics(ctx)),
            started_at,
        })
        .await?;
    let run_id = record.run_id;
    obs::emit_run_started(&run_id.0, &ctx.agent_name, tenant.as_str());

    let run_ctx = RunContext::new(
        run_id.clone(),
        agent_id,
        ctx.agent_name.clone(),
        tenant,
        store.clone(),
    );
    let span = obs::run_span(&run_id.0, &ctx.agent_name);
    let result = run_context::run_with(run_ctx, executor())
        .instrument(span)
        .await;

    let duration = clock.elapsed();
    let duration_ms = duration.as_millis() as u64;
    let mut metrics = baseline_metrics(ctx);
    metrics.insert("durationMs".to_string(), json!(duration_ms));
    let completed_at = Utc::now().max(started_at);

    let outcome = match result {
        Ok(result) => {
            let mut success_metrics = metrics.clone();
            if let Some(build) = &options.build_metrics {
                success_metrics.extend(build(&result));
            }
            let completed = store
                .complete_run(
                    &run_id,
                    serialize_or_sentinel(&result),
                    Value::Object(success_metrics),
                    completed_at,
                )
                .await;
            match completed {
                Ok(()) => Ok(RunOutcome { run_id: run_id.clone(), result }),
                Err(store_err) => {
                    insert_error(&mut metrics, &store_err);
                    record_failure(store.as_ref(), &run_id, metrics, completed_at).await;
                    Err(LifecycleError::Storage(store_err))
                }
            }
        }
        Err(err) => {
            insert_error(&mut metrics, &err);
            record_failure(store.as_ref(), &run_id, metrics, completed_at).await;
            Err(LifecycleError::Execution(err))
        }
    };

    let succeeded = outcome.is_ok();
    obs::emit_run_finished(&run_id.0, duration_ms, succeeded);
    if let Some(sink) = &options.sink {
        let status = if succeeded { "success" } else { "failed" };
        sink.record_agent_run(&ctx.agent_name, status, duration, &ctx.intent);
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::AgentFault;
    use relay_state::{MemoryStore, RunStatus, RunStore};
    use std::collections::HashMap;

    fn ctx(tenant: Option<&str>) -> ExecutionContext {
        ExecutionContext {
            tenant_id: tenant.map(str::to_string),
            caller_id: Some("u1".to_string()),
            agent_name: "ContentAgent".to_string(),
            intent: "generate-draft".to_string(),
        }
    }

    #[test]
    fn sentinel_replaces_unserializable_values() {
        let mut bad: HashMap<(u8, u8), u8> = HashMap::new();
        bad.insert((1, 2), 3);
        let value = serialize_or_sentinel(&bad);
        assert!(value[SERIALIZATION_ERROR_KEY].is_string());

        assert_eq!(serialize_or_sentinel(&json!({"a": 1})), json!({"a": 1}));
    }

    #[tokio::test]
    async fn missing_tenant_is_rejected_before_any_record() {
        let store = Arc::new(MemoryStore::new());
        let err = execute_run(
            store.clone(),
            "agent-1",
            &ctx(None),
            &json!({}),
            || async { Ok::<_, AgentFault>(1) },
            RunOptions::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, LifecycleError::MissingTenant));
        assert_eq!(store.run_count(), 0);

        let blank = execute_run(
            store.clone(),
            "agent-1",
            &ctx(Some("  ")),
            &json!({}),
            || async { Ok::<_, AgentFault>(1) },
            RunOptions::default(),
        )
        .await;
        assert!(matches!(blank, Err(LifecycleError::MissingTenant)));
    }

    #[tokio::test]
    async fn success_records_output_and_metrics() {
        let store = Arc::new(MemoryStore::new());
        let outcome = execute_run(
            store.clone(),
            "agent-1",
            &ctx(Some("org1")),
            &json!({"topic": "rust"}),
            || async {
                let bound = run_context::current().expect("context bound");
                assert_eq!(bound.agent_name(), "ContentAgent");
                assert_eq!(bound.tenant_id().as_str(), "org1");
                Ok::<_, AgentFault>(json!({"draft": "hello"}))
            },
            RunOptions::default().with_metrics(|out: &Value| {
                let mut m = Map::new();
                m.insert("chars".to_string(), json!(out["draft"].as_str().map(str::len)));
                m
            }),
        )
        .await
        .unwrap();

        let run = store.get_run(&outcome.run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(run.input, json!({"topic": "rust"}));
        assert_eq!(run.output, Some(json!({"draft": "hello"})));
        assert_eq!(run.metrics["intent"], "generate-draft");
        assert_eq!(run.metrics["callerId"], "u1");
        assert_eq!(run.metrics["chars"], 5);
        assert!(run.metrics["durationMs"].is_u64());
        assert!(run.completed_at.unwrap() >= run.started_at);
    }

    #[tokio::test]
    async fn failure_records_error_and_returns_original() {
        let store = Arc::new(MemoryStore::new());
        let err = execute_run(
            store.clone(),
            "agent-1",
            &ctx(Some("org1")),
            &json!(null),
            || async {
                Err::<Value, _>(AgentFault::caused_by(
                    "draft failed",
                    &AgentFault::new("model timeout"),
                ))
            },
            RunOptions::default(),
        )
        .await
        .unwrap_err();

        match err {
            LifecycleError::Execution(fault) => assert_eq!(fault.message(), "draft failed"),
            other => panic!("expected Execution, got {other:?}"),
        }

        let runs = store.all_runs();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert!(runs[0].output.is_none());
        assert_eq!(runs[0].metrics["error"], "draft failed");
        assert!(runs[0].metrics["stack"]
            .as_str()
            .unwrap()
            .contains("caused by: model timeout"));
    }

    #[tokio::test]
    async fn context_is_released_after_run() {
        let store = Arc::new(MemoryStore::new());
        execute_run(
            store,
            "agent-1",
            &ctx(Some("org1")),
            &json!(null),
            || async { Ok::<_, AgentFault>(()) },
            RunOptions::default(),
        )
        .await
        .unwrap();
        assert!(run_context::current().is_none());
    }
}
