//! Tool call attribution.
//!
//! Nested operations started by a handler (model calls, lookups, fetches) go
//! through [`execute_tool`], which tags the call with whatever run is bound by
//! [`crate::run_context`] and reports it to the metrics sink.

use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::metrics::MetricsSink;
use crate::obs;
use crate::run_context;

/// Tool execution status for observability.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Succeeded,
    Failed,
}

impl ToolCallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCallStatus::Succeeded => "success",
            ToolCallStatus::Failed => "failed",
        }
    }
}

/// Attribution and timing for one tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolTelemetry {
    pub run_id: Option<String>,
    pub agent_name: Option<String>,
    pub tenant_id: Option<String>,
    pub tool_name: String,
    pub duration_ms: u64,
    pub status: ToolCallStatus,
}

/// Tool output (or error) plus telemetry.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolExecutionReport<R> {
    pub output: R,
    pub telemetry: ToolTelemetry,
}

impl<T, E> ToolExecutionReport<Result<T, E>> {
    /// Drop the telemetry and keep the tool's result.
    pub fn into_result(self) -> Result<T, E> {
        self.output
    }
}

/// Run `fut` as the tool `tool_name`, attributed to the current run (if any).
pub async fn execute_tool<T, E, Fut>(
    metrics: &dyn MetricsSink,
    tool_name: &str,
    fut: Fut,
) -> ToolExecutionReport<Result<T, E>>
where
    Fut: Future<Output = Result<T, E>>,
{
    let ctx = run_context::current();
    let started = Instant::now();
    let output = fut.await;
    let duration = started.elapsed();

    let status = if output.is_ok() {
        ToolCallStatus::Succeeded
    } else {
        ToolCallStatus::Failed
    };
    let run_id = ctx.as_ref().map(|c| c.run_id().0.clone());
    metrics.record_tool_execution(tool_name, status.as_str(), duration);
    obs::emit_tool_executed(
        tool_name,
        run_id.as_deref(),
        duration.as_millis() as u64,
        output.is_ok(),
    );

    ToolExecutionReport {
        output,
        telemetry: ToolTelemetry {
            run_id,
            agent_name: ctx.as_ref().map(|c| c.agent_name().to_string()),
            tenant_id: ctx.as_ref().map(|c| c.tenant_id().to_string()),
            tool_name: tool_name.to_string(),
            duration_ms: duration.as_millis() as u64,
            status,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::OrchestratorMetrics;
    use crate::run_context::{run_with, RunContext};
    use relay_state::{MemoryStore, RunId, TenantId};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn tool_call_is_attributed_to_bound_run() {
        let metrics = OrchestratorMetrics::new();
        let ctx = RunContext::new(
            RunId("run-42".to_string()),
            "agent-record-1",
            "SEOAgent",
            TenantId::parse("org1").unwrap(),
            Arc::new(MemoryStore::new()),
        );

        let report = run_with(ctx, async {
            execute_tool(&metrics, "keyword-lookup", async {
                tokio::time::sleep(Duration::from_millis(250)).await;
                Ok::<_, String>(vec!["rust", "tokio"])
            })
            .await
        })
        .await;

        assert_eq!(report.telemetry.run_id.as_deref(), Some("run-42"));
        assert_eq!(report.telemetry.agent_name.as_deref(), Some("SEOAgent"));
        assert_eq!(report.telemetry.tenant_id.as_deref(), Some("org1"));
        assert_eq!(report.telemetry.status, ToolCallStatus::Succeeded);
        assert!(report.telemetry.duration_ms >= 250);
        assert_eq!(report.into_result().unwrap(), vec!["rust", "tokio"]);
        assert_eq!(metrics.tool_executions(), 1);
    }

    #[tokio::test]
    async fn unattributed_failure_is_still_reported() {
        let metrics = OrchestratorMetrics::new();
        let report = execute_tool(&metrics, "fetch-page", async {
            Err::<(), _>("404".to_string())
        })
        .await;

        assert!(report.telemetry.run_id.is_none());
        assert!(report.telemetry.agent_name.is_none());
        assert_eq!(report.telemetry.status, ToolCallStatus::Failed);
        assert_eq!(report.output, Err("404".to_string()));
        assert_eq!(metrics.tool_executions(), 1);
    }
}
