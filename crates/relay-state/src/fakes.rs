//! In-memory fakes for storage traits (testing and untracked local runs)
//!
//! `MemoryStore` satisfies both `AgentStore` and `RunStore` contracts without
//! any external dependencies.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::StorageError;
use crate::storage_traits::*;

#[derive(Debug, Default)]
struct Tables {
    /// keyed by (tenant, name)
    agents: HashMap<(String, String), AgentRecord>,
    /// keyed by run id
    runs: HashMap<String, RunRecord>,
}

/// In-memory agent + run store backed by `HashMap`s.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of run records across all tenants.
    pub fn run_count(&self) -> usize {
        self.tables().runs.len()
    }

    /// Number of agent records across all tenants.
    pub fn agent_count(&self) -> usize {
        self.tables().agents.len()
    }

    /// All run records, oldest first.
    pub fn all_runs(&self) -> Vec<RunRecord> {
        let mut runs: Vec<RunRecord> = self.tables().runs.values().cloned().collect();
        runs.sort_by_key(|r| r.started_at);
        runs
    }

    fn finish(
        &self,
        run_id: &RunId,
        status: RunStatus,
        output: Option<Value>,
        metrics: Value,
        completed_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut tables = self.tables();
        let record = tables
            .runs
            .get_mut(&run_id.0)
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.0.clone(),
            })?;
        if record.status != RunStatus::Running {
            return Err(StorageError::InvalidRunState {
                run_id: run_id.0.clone(),
                status: record.status.to_string(),
                expected: RunStatus::Running.to_string(),
            });
        }
        record.status = status;
        record.output = output;
        record.metrics = metrics;
        record.completed_at = Some(completed_at);
        Ok(())
    }
}

#[async_trait]
impl AgentStore for MemoryStore {
    async fn find_agent(
        &self,
        tenant: &TenantId,
        name: &str,
    ) -> StorageResult<Option<AgentRecord>> {
        let key = (tenant.as_str().to_string(), name.to_string());
        Ok(self.tables().agents.get(&key).cloned())
    }

    async fn create_agent(
        &self,
        tenant: &TenantId,
        agent: NewAgent,
    ) -> StorageResult<AgentRecord> {
        let key = (tenant.as_str().to_string(), agent.name.clone());
        let mut tables = self.tables();
        // A concurrent creator may have won the race; keep the first record.
        let record = tables.agents.entry(key).or_insert_with(|| AgentRecord {
            agent_id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant.clone(),
            name: agent.name,
            slug: agent.slug,
            kind: agent.kind,
            status: agent.status,
            description: agent.description,
            config: agent.config,
            created_at: Utc::now(),
        });
        Ok(record.clone())
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn create_run(&self, run: NewRun) -> StorageResult<RunRecord> {
        let record = RunRecord {
            run_id: RunId::new(),
            agent_id: run.agent_id,
            tenant_id: run.tenant_id,
            status: RunStatus::Running,
            input: run.input,
            output: None,
            metrics: run.metrics,
            started_at: run.started_at,
            completed_at: None,
        };
        self.tables()
            .runs
            .insert(record.run_id.0.clone(), record.clone());
        Ok(record)
    }

    async fn complete_run(
        &self,
        run_id: &RunId,
        output: Value,
        metrics: Value,
        completed_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.finish(run_id, RunStatus::Success, Some(output), metrics, completed_at)
    }

    async fn fail_run(
        &self,
        run_id: &RunId,
        metrics: Value,
        completed_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.finish(run_id, RunStatus::Failed, None, metrics, completed_at)
    }

    async fn get_run(&self, run_id: &RunId) -> StorageResult<RunRecord> {
        self.tables()
            .runs
            .get(&run_id.0)
            .cloned()
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.0.clone(),
            })
    }

    async fn list_runs(
        &self,
        tenant: &TenantId,
        agent_id: Option<&str>,
    ) -> StorageResult<Vec<RunRecord>> {
        let mut records: Vec<RunRecord> = self
            .tables()
            .runs
            .values()
            .filter(|r| &r.tenant_id == tenant)
            .filter(|r| agent_id.map(|a| r.agent_id == a).unwrap_or(true))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(records)
    }
}
