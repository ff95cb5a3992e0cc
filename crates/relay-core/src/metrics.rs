//! Orchestrator metrics.
//!
//! Call sites report through the [`MetricsSink`] trait. The in-process
//! [`OrchestratorMetrics`] keeps lock-free totals plus labelled counters and
//! a run-duration histogram. Call [`OrchestratorMetrics::flush`] to emit
//! current values as a single `tracing::info!` event.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;

/// Upper bounds (seconds) of the run-duration histogram buckets.
pub const RUN_DURATION_BUCKETS: [f64; 8] = [0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0];

/// Destination for orchestrator measurements.
pub trait MetricsSink: Send + Sync {
    /// One finished agent run. `status` is `"success"` or `"failed"`.
    fn record_agent_run(&self, agent: &str, status: &str, duration: Duration, intent: &str);
    /// A call rejected by an open circuit breaker.
    fn record_circuit_breaker_failure(&self, agent: &str);
    /// Breaker for `agent` opened (`true`) or closed (`false`).
    fn set_circuit_state(&self, agent: &str, open: bool);
    /// A request rejected by the rate limiter.
    fn record_rate_limit_hit(&self, agent: &str, caller: &str);
    /// One nested tool execution.
    fn record_tool_execution(&self, tool: &str, status: &str, duration: Duration);
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_agent_run(&self, _: &str, _: &str, _: Duration, _: &str) {}
    fn record_circuit_breaker_failure(&self, _: &str) {}
    fn set_circuit_state(&self, _: &str, _: bool) {}
    fn record_rate_limit_hit(&self, _: &str, _: &str) {}
    fn record_tool_execution(&self, _: &str, _: &str, _: Duration) {}
}

#[derive(Debug, Default)]
struct Labelled {
    /// (agent, status, intent)
    agent_runs: HashMap<(String, String, String), u64>,
    breaker_failures: HashMap<String, u64>,
    circuit_open: HashMap<String, bool>,
    /// (agent, caller)
    rate_limit_hits: HashMap<(String, String), u64>,
    /// (tool, status)
    tool_executions: HashMap<(String, String), u64>,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub agent_runs_total: u64,
    pub agent_runs_failed: u64,
    pub circuit_breaker_failures_total: u64,
    pub rate_limit_hits_total: u64,
    pub tool_executions_total: u64,
    /// Cumulative histogram counts, one per bucket plus `+Inf`.
    pub run_duration_buckets: Vec<u64>,
    pub run_duration_sum_ms: u64,
    /// `agent/status/intent` -> count
    pub agent_runs: BTreeMap<String, u64>,
    /// agents whose breaker is currently reported open
    pub open_circuits: Vec<String>,
}

/// Lock-free totals plus labelled counters.
#[derive(Debug)]
pub struct OrchestratorMetrics {
    agent_runs_total: AtomicU64,
    agent_runs_failed: AtomicU64,
    circuit_breaker_failures: AtomicU64,
    rate_limit_hits: AtomicU64,
    tool_executions: AtomicU64,
    duration_buckets: [AtomicU64; RUN_DURATION_BUCKETS.len() + 1],
    duration_sum_ms: AtomicU64,
    labelled: Mutex<Labelled>,
}

impl Default for OrchestratorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorMetrics {
    pub fn new() -> Self {
        Self {
            agent_runs_total: AtomicU64::new(0),
            agent_runs_failed: AtomicU64::new(0),
            circuit_breaker_failures: AtomicU64::new(0),
            rate_limit_hits: AtomicU64::new(0),
            tool_executions: AtomicU64::new(0),
            duration_buckets: Default::default(),
            duration_sum_ms: AtomicU64::new(0),
            labelled: Mutex::new(Labelled::default()),
        }
    }

    fn labelled(&self) -> MutexGuard<'_, Labelled> {
        self.labelled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observe_duration(&self, duration: Duration) {
        let secs = duration.as_secs_f64();
        let idx = RUN_DURATION_BUCKETS
            .iter()
            .position(|bound| secs <= *bound)
            .unwrap_or(RUN_DURATION_BUCKETS.len());
        self.duration_buckets[idx].fetch_add(1, Ordering::Relaxed);
        self.duration_sum_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn agent_runs_total(&self) -> u64 {
        self.agent_runs_total.load(Ordering::Relaxed)
    }

    pub fn agent_runs_failed(&self) -> u64 {
        self.agent_runs_failed.load(Ordering::Relaxed)
    }

    pub fn circuit_breaker_failures(&self) -> u64 {
        self.circuit_breaker_failures.load(Ordering::Relaxed)
    }

    pub fn rate_limit_hits(&self) -> u64 {
        self.rate_limit_hits.load(Ordering::Relaxed)
    }

    pub fn tool_executions(&self) -> u64 {
        self.tool_executions.load(Ordering::Relaxed)
    }

    /// Runs recorded for a specific (agent, status, intent) label set.
    pub fn agent_runs(&self, agent: &str, status: &str, intent: &str) -> u64 {
        let key = (agent.to_string(), status.to_string(), intent.to_string());
        self.labelled().agent_runs.get(&key).copied().unwrap_or(0)
    }

    /// Rate-limit hits recorded for (agent, caller).
    pub fn rate_limit_hits_for(&self, agent: &str, caller: &str) -> u64 {
        let key = (agent.to_string(), caller.to_string());
        self.labelled().rate_limit_hits.get(&key).copied().unwrap_or(0)
    }

    /// Whether the breaker for `agent` was last reported open.
    pub fn circuit_open(&self, agent: &str) -> bool {
        self.labelled()
            .circuit_open
            .get(agent)
            .copied()
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut cumulative = 0;
        let run_duration_buckets = self
            .duration_buckets
            .iter()
            .map(|b| {
                cumulative += b.load(Ordering::Relaxed);
                cumulative
            })
            .collect();

        let labelled = self.labelled();
        let agent_runs = labelled
            .agent_runs
            .iter()
            .map(|((agent, status, intent), n)| (format!("{agent}/{status}/{intent}"), *n))
            .collect();
        let mut open_circuits: Vec<String> = labelled
            .circuit_open
            .iter()
            .filter(|(_, open)| **open)
            .map(|(agent, _)| agent.clone())
            .collect();
        open_circuits.sort();

        MetricsSnapshot {
            agent_runs_total: self.agent_runs_total(),
            agent_runs_failed: self.agent_runs_failed(),
            circuit_breaker_failures_total: self.circuit_breaker_failures(),
            rate_limit_hits_total: self.rate_limit_hits(),
            tool_executions_total: self.tool_executions(),
            run_duration_buckets,
            run_duration_sum_ms: self.duration_sum_ms.load(Ordering::Relaxed),
            agent_runs,
            open_circuits,
        }
    }

    /// Emit all current totals as a single `info!` event.
    ///
    /// Call this at natural boundaries (end of a CLI command, shutdown)
    /// rather than on every increment.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            agent_runs_total = self.agent_runs_total(),
            agent_runs_failed = self.agent_runs_failed(),
            circuit_breaker_failures = self.circuit_breaker_failures(),
            rate_limit_hits = self.rate_limit_hits(),
            tool_executions = self.tool_executions(),
            run_duration_sum_ms = self.duration_sum_ms.load(Ordering::Relaxed),
        );
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.agent_runs_total.store(0, Ordering::Relaxed);
        self.agent_runs_failed.store(0, Ordering::Relaxed);
        self.circuit_breaker_failures.store(0, Ordering::Relaxed);
        self.rate_limit_hits.store(0, Ordering::Relaxed);
        self.tool_executions.store(0, Ordering::Relaxed);
        for bucket in &self.duration_buckets {
            bucket.store(0, Ordering::Relaxed);
        }
        self.duration_sum_ms.store(0, Ordering::Relaxed);
        *self.labelled() = Labelled::default();
    }
}

impl MetricsSink for OrchestratorMetrics {
    fn record_agent_run(&self, agent: &str, status: &str, duration: Duration, intent: &str) {
        self.agent_runs_total.fetch_add(1, Ordering::Relaxed);
        if status != "success" {
            self.agent_runs_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.observe_duration(duration);
        *self
            .labelled()
            .agent_runs
            .entry((agent.to_string(), status.to_string(), intent.to_string()))
            .or_insert(0) += 1;
        tracing::trace!(metric = "agent_runs_total", agent, status, intent, "counter incremented");
    }

    fn record_circuit_breaker_failure(&self, agent: &str) {
        self.circuit_breaker_failures.fetch_add(1, Ordering::Relaxed);
        *self
            .labelled()
            .breaker_failures
            .entry(agent.to_string())
            .or_insert(0) += 1;
        tracing::trace!(metric = "circuit_breaker_failures_total", agent, "counter incremented");
    }

    fn set_circuit_state(&self, agent: &str, open: bool) {
        self.labelled()
            .circuit_open
            .insert(agent.to_string(), open);
        tracing::trace!(metric = "circuit_breaker_state", agent, open, "gauge set");
    }

    fn record_rate_limit_hit(&self, agent: &str, caller: &str) {
        self.rate_limit_hits.fetch_add(1, Ordering::Relaxed);
        *self
            .labelled()
            .rate_limit_hits
            .entry((agent.to_string(), caller.to_string()))
            .or_insert(0) += 1;
        tracing::trace!(metric = "rate_limit_hits_total", agent, caller, "counter incremented");
    }

    fn record_tool_execution(&self, tool: &str, status: &str, _duration: Duration) {
        self.tool_executions.fetch_add(1, Ordering::Relaxed);
        *self
            .labelled()
            .tool_executions
            .entry((tool.to_string(), status.to_string()))
            .or_insert(0) += 1;
        tracing::trace!(metric = "tool_executions_total", tool, status, "counter incremented");
    }
}
