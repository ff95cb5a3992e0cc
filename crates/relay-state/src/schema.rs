//! Row definitions for Relay SurrealDB tables
//!
//! Tables:
//! - agents: one row per (tenant, agent name)
//! - agent_runs: one row per agent invocation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StorageError;
use crate::storage_traits::{AgentRecord, NewAgent, NewRun, RunId, RunRecord, RunStatus, TenantId};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Module for serializing optional chrono DateTime to SurrealDB datetime format
mod surreal_datetime_opt {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => {
                let sd = SurrealDatetime::from(*d);
                serde::Serialize::serialize(&Some(sd), serializer)
            }
            None => serde::Serialize::serialize(&None::<SurrealDatetime>, serializer),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = Option::<SurrealDatetime>::deserialize(deserializer)?;
        Ok(sd.map(DateTime::from))
    }
}

/// Agent row stored in the `agents` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub agent_id: String,
    pub tenant_id: String,
    pub name: String,
    pub slug: String,
    pub kind: String,
    pub status: String,
    pub description: String,
    pub config: Value,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl AgentRow {
    /// Create a new agent row with a fresh UUID
    pub fn new(tenant: &TenantId, agent: NewAgent) -> Self {
        AgentRow {
            id: None,
            agent_id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant.as_str().to_string(),
            name: agent.name,
            slug: agent.slug,
            kind: agent.kind,
            status: agent.status,
            description: agent.description,
            config: agent.config,
            created_at: Utc::now(),
        }
    }

    pub fn into_record(self) -> Result<AgentRecord, StorageError> {
        Ok(AgentRecord {
            agent_id: self.agent_id,
            tenant_id: TenantId::parse(self.tenant_id)?,
            name: self.name,
            slug: self.slug,
            kind: self.kind,
            status: self.status,
            description: self.description,
            config: self.config,
            created_at: self.created_at,
        })
    }
}

/// Run row stored in the `agent_runs` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    /// Unique run ID (UUID string)
    pub run_id: String,
    pub agent_id: String,
    pub tenant_id: String,
    /// Run status: "running" | "success" | "failed"
    pub status: String,
    pub input: Value,
    #[serde(default)]
    pub output: Option<Value>,
    pub metrics: Value,
    #[serde(with = "surreal_datetime")]
    pub started_at: DateTime<Utc>,
    #[serde(default, with = "surreal_datetime_opt")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunRow {
    /// Create a new run row in "running" state
    pub fn new(run_id: &RunId, run: NewRun) -> Self {
        RunRow {
            id: None,
            run_id: run_id.0.clone(),
            agent_id: run.agent_id,
            tenant_id: run.tenant_id.as_str().to_string(),
            status: RunStatus::Running.to_string(),
            input: run.input,
            output: None,
            metrics: run.metrics,
            started_at: run.started_at,
            completed_at: None,
        }
    }

    /// Mark run as successful
    pub fn succeed(mut self, output: Value, metrics: Value, completed_at: DateTime<Utc>) -> Self {
        self.status = RunStatus::Success.to_string();
        self.output = Some(output);
        self.metrics = metrics;
        self.completed_at = Some(completed_at);
        self
    }

    /// Mark run as failed
    pub fn fail(mut self, metrics: Value, completed_at: DateTime<Utc>) -> Self {
        self.status = RunStatus::Failed.to_string();
        self.metrics = metrics;
        self.completed_at = Some(completed_at);
        self
    }

    pub fn into_record(self) -> Result<RunRecord, StorageError> {
        Ok(RunRecord {
            run_id: RunId(self.run_id),
            agent_id: self.agent_id,
            tenant_id: TenantId::parse(self.tenant_id)?,
            status: self.status.parse()?,
            input: self.input,
            output: self.output,
            metrics: self.metrics,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tenant() -> TenantId {
        TenantId::parse("org-1").unwrap()
    }

    #[test]
    fn test_run_row_new_is_running() {
        let run_id = RunId("run-123".to_string());
        let row = RunRow::new(
            &run_id,
            NewRun {
                agent_id: "agent-1".to_string(),
                tenant_id: tenant(),
                input: json!({"topic": "rust"}),
                metrics: json!({"intent": "generate-draft"}),
                started_at: Utc::now(),
            },
        );

        assert_eq!(row.run_id, "run-123");
        assert_eq!(row.status, "running");
        assert!(row.output.is_none());
        assert!(row.completed_at.is_none());
    }

    #[test]
    fn test_run_row_succeed_and_convert() {
        let started = Utc::now();
        let row = RunRow::new(
            &RunId("run-9".to_string()),
            NewRun {
                agent_id: "agent-1".to_string(),
                tenant_id: tenant(),
                input: json!(null),
                metrics: json!({}),
                started_at: started,
            },
        )
        .succeed(json!({"ok": true}), json!({"durationMs": 4}), Utc::now());

        let record = row.into_record().unwrap();
        assert_eq!(record.status, RunStatus::Success);
        assert_eq!(record.output, Some(json!({"ok": true})));
        assert!(record.completed_at.unwrap() >= started);
    }

    #[test]
    fn test_run_row_unknown_status_rejected() {
        let mut row = RunRow::new(
            &RunId::new(),
            NewRun {
                agent_id: "a".to_string(),
                tenant_id: tenant(),
                input: json!(null),
                metrics: json!({}),
                started_at: Utc::now(),
            },
        );
        row.status = "COMPLETED".to_string();
        assert!(matches!(row.into_record(), Err(StorageError::Backend(_))));
    }

    #[test]
    fn test_agent_row_serialization_skips_empty_id() {
        let row = AgentRow::new(&tenant(), NewAgent::auto_created("SEOAgent"));
        let json = serde_json::to_value(&row).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["slug"], "seo");
        assert_eq!(json["tenant_id"], "org-1");
    }
}
