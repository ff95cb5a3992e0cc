//! Structured observability hooks for the orchestrator.
//!
//! This module provides:
//! - Request- and run-scoped tracing spans (attach with `tracing::Instrument`)
//! - Emission functions for key events: registration, rejection, run start and
//!   finish, retries, breaker transitions, rate-limit hits, tool calls
//!
//! Every event carries an `event = "..."` field so log pipelines can filter on
//! it. Verbosity is controlled via `RELAY_LOG` (see [`crate::telemetry`]).

use std::time::Duration;

use tracing::{info, warn, Span};

/// Span covering one routed request.
pub fn request_span(request_id: &str, intent: &str, agent: Option<&str>) -> Span {
    tracing::info_span!(
        "relay.request",
        request_id = %request_id,
        intent = %intent,
        agent = agent.unwrap_or("unknown"),
    )
}

/// Span covering one tracked run.
pub fn run_span(run_id: &str, agent_name: &str) -> Span {
    tracing::info_span!("relay.run", run_id = %run_id, agent_name = %agent_name)
}

/// Emit event: an agent handler was registered (or re-registered).
pub fn emit_agent_registered(agent: &str, version: Option<&str>, capabilities: usize) {
    info!(
        event = "agent.registered",
        agent = %agent,
        version = version.unwrap_or("unversioned"),
        capabilities = capabilities,
    );
}

/// Emit event: the request was rejected before reaching a handler.
pub fn emit_request_rejected(intent: &str, agent: Option<&str>, code: &str, message: &str) {
    info!(
        event = "request.rejected",
        intent = %intent,
        agent = agent.unwrap_or("unknown"),
        code = %code,
        message = %message,
    );
}

/// Emit event: no tenant on the request, running without a run record.
pub fn emit_untracked_execution(agent: &str, intent: &str) {
    warn!(
        event = "run.untracked",
        agent = %agent,
        intent = %intent,
        "No organizationId in context, skipping run persistence"
    );
}

/// Emit event: run started with agent name.
///
/// # Example
///
/// ```ignore
/// emit_run_started("run-123", "ContentAgent", "org-1");
/// // logs: event=run.started run_id=run-123 agent_name=ContentAgent tenant_id=org-1
/// ```
pub fn emit_run_started(run_id: &str, agent_name: &str, tenant_id: &str) {
    info!(
        event = "run.started",
        run_id = %run_id,
        agent_name = %agent_name,
        tenant_id = %tenant_id,
    );
}

/// Emit event: run finished with duration and success status.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        success = success,
    );
}

/// Emit event: run finalization error (warning level).
pub fn emit_run_finalize_error(run_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.finalize_error", run_id = %run_id, error = %error);
}

/// Emit event: a routed request completed.
pub fn emit_run_completed(
    agent: &str,
    intent: &str,
    run_id: Option<&str>,
    duration_seconds: f64,
    response_ok: bool,
) {
    info!(
        event = "run.completed",
        agent = %agent,
        intent = %intent,
        run_id = run_id.unwrap_or(""),
        duration_seconds = duration_seconds,
        response_ok = response_ok,
    );
}

/// Emit event: a routed request failed with a raised fault.
pub fn emit_run_failed(agent: &str, intent: &str, code: &str, error: &dyn std::fmt::Display) {
    tracing::error!(
        event = "run.failed",
        agent = %agent,
        intent = %intent,
        code = %code,
        error = %error,
    );
}

/// Emit event: an attempt failed and another one is scheduled.
pub fn emit_retry_scheduled(
    agent: &str,
    attempt: u32,
    delay: Duration,
    error: &dyn std::fmt::Display,
) {
    warn!(
        event = "retry.scheduled",
        agent = %agent,
        attempt = attempt,
        delay_ms = delay.as_millis() as u64,
        error = %error,
    );
}

/// Emit event: failures reached the breaker threshold.
pub fn emit_circuit_opened(agent: &str, failure_count: u32, cooldown_ms: u64) {
    warn!(
        event = "circuit.opened",
        agent = %agent,
        failure_count = failure_count,
        cooldown_ms = cooldown_ms,
    );
}

/// Emit event: a call was rejected by an open breaker.
pub fn emit_circuit_rejected(agent: &str, failure_count: u32, retry_after: Duration) {
    warn!(
        event = "circuit.rejected",
        agent = %agent,
        failure_count = failure_count,
        retry_after_ms = retry_after.as_millis() as u64,
    );
}

/// Emit event: a caller exhausted its rate-limit window.
pub fn emit_rate_limit_hit(agent: &str, caller_id: &str, limit: u32) {
    warn!(
        event = "rate_limit.hit",
        agent = %agent,
        caller_id = %caller_id,
        limit = limit,
    );
}

/// Emit event: a nested tool call finished.
pub fn emit_tool_executed(tool_name: &str, run_id: Option<&str>, duration_ms: u64, success: bool) {
    info!(
        event = "tool.executed",
        tool_name = %tool_name,
        run_id = run_id.unwrap_or(""),
        duration_ms = duration_ms,
        success = success,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_spans_create() {
        let _request = request_span("req-1", "summarize", None).entered();
        let _run = run_span("run-1", "ContentAgent").entered();
    }

    #[traced_test]
    #[test]
    fn test_rate_limit_hit_event() {
        emit_rate_limit_hit("ContentAgent", "u1", 60);
        assert!(logs_contain("rate_limit.hit"));
        assert!(logs_contain("caller_id=u1"));
    }
}
