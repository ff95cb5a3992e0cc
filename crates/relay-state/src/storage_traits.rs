//! Storage trait definitions for Relay
//!
//! These traits define the durable collaborators of the orchestrator:
//! - `AgentStore`: one agent record per (tenant, agent name)
//! - `RunStore`: one run record per agent invocation
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Tenant (organization) identifier.
///
/// Always non-empty; construct through [`TenantId::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Validate a raw tenant identifier.
    pub fn parse(raw: impl Into<String>) -> StorageResult<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(StorageError::InvalidTenant {
                reason: "tenant id must not be empty".to_string(),
            });
        }
        Ok(TenantId(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TenantId {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        TenantId::parse(s)
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an agent run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new random RunId
    pub fn new() -> Self {
        RunId(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// AgentStore: durable agent records
// ---------------------------------------------------------------------------

/// Fields supplied when an agent record is first created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewAgent {
    pub name: String,
    pub slug: String,
    pub kind: String,
    pub status: String,
    pub description: String,
    pub config: Value,
}

impl NewAgent {
    /// Defaults used when the orchestrator creates an agent on first use.
    pub fn auto_created(name: &str) -> Self {
        Self {
            name: name.to_string(),
            slug: slug_for(name),
            kind: "COPILOT".to_string(),
            status: "ACTIVE".to_string(),
            description: format!("Auto-created agent for {name}"),
            config: serde_json::json!({}),
        }
    }
}

/// `ContentAgent` -> `content`, `SEOAgent` -> `seo`.
pub fn slug_for(name: &str) -> String {
    let lower = name.to_lowercase();
    match lower.strip_suffix("agent") {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => lower,
    }
}

/// Durable agent record, unique per (tenant, name).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRecord {
    pub agent_id: String,
    pub tenant_id: TenantId,
    pub name: String,
    pub slug: String,
    pub kind: String,
    pub status: String,
    pub description: String,
    pub config: Value,
    pub created_at: DateTime<Utc>,
}

/// Agent record persistence.
///
/// Guarantees:
/// - At most one record exists per (tenant, name).
/// - `find_agent` never creates.
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Look up the agent record for (tenant, name).
    async fn find_agent(&self, tenant: &TenantId, name: &str)
        -> StorageResult<Option<AgentRecord>>;

    /// Create a new agent record for the tenant.
    async fn create_agent(&self, tenant: &TenantId, agent: NewAgent)
        -> StorageResult<AgentRecord>;

    /// Return the existing record for (tenant, name), creating it on first use.
    async fn ensure_agent(&self, tenant: &TenantId, name: &str) -> StorageResult<AgentRecord> {
        if let Some(existing) = self.find_agent(tenant, name).await? {
            return Ok(existing);
        }
        let created = self
            .create_agent(tenant, NewAgent::auto_created(name))
            .await?;
        tracing::info!(
            agent_id = %created.agent_id,
            agent_name = %created.name,
            tenant_id = %tenant,
            "Created new agent record"
        );
        Ok(created)
    }
}

// ---------------------------------------------------------------------------
// RunStore: agent run persistence
// ---------------------------------------------------------------------------

/// Status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "failed" => Ok(RunStatus::Failed),
            other => Err(StorageError::Backend(format!("unknown run status: {other}"))),
        }
    }
}

/// Fields supplied when a run is opened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRun {
    pub agent_id: String,
    pub tenant_id: TenantId,
    pub input: Value,
    pub metrics: Value,
    pub started_at: DateTime<Utc>,
}

/// Full run record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    pub run_id: RunId,
    pub agent_id: String,
    pub tenant_id: TenantId,
    pub status: RunStatus,
    pub input: Value,
    pub output: Option<Value>,
    pub metrics: Value,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Agent run persistence.
///
/// Guarantees:
/// - A run transitions: Running → Success | Failed (terminal).
/// - Terminal runs are immutable.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Open a run in `Running` state.
    async fn create_run(&self, run: NewRun) -> StorageResult<RunRecord>;

    /// Mark a running run as successful.
    async fn complete_run(
        &self,
        run_id: &RunId,
        output: Value,
        metrics: Value,
        completed_at: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Mark a running run as failed.
    async fn fail_run(
        &self,
        run_id: &RunId,
        metrics: Value,
        completed_at: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Retrieve a run record by ID.
    async fn get_run(&self, run_id: &RunId) -> StorageResult<RunRecord>;

    /// List a tenant's runs (newest first), optionally for one agent record.
    async fn list_runs(
        &self,
        tenant: &TenantId,
        agent_id: Option<&str>,
    ) -> StorageResult<Vec<RunRecord>>;
}

/// Everything the orchestrator needs from its durable store.
pub trait OrchestratorStore: AgentStore + RunStore {}

impl<T: AgentStore + RunStore + ?Sized> OrchestratorStore for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_id_rejects_blank() {
        assert!(TenantId::parse("").is_err());
        assert!(TenantId::parse("   ").is_err());
        assert_eq!(TenantId::parse(" org1 ").unwrap().as_str(), "org1");
    }

    #[test]
    fn tenant_id_deserialize_validates() {
        let ok: TenantId = serde_json::from_str("\"org-7\"").unwrap();
        assert_eq!(ok.as_str(), "org-7");
        assert!(serde_json::from_str::<TenantId>("\"\"").is_err());
    }

    #[test]
    fn slug_strips_agent_suffix() {
        assert_eq!(slug_for("ContentAgent"), "content");
        assert_eq!(slug_for("SEOAgent"), "seo");
        assert_eq!(slug_for("Agent"), "agent");
        assert_eq!(slug_for("planner"), "planner");
    }

    #[test]
    fn auto_created_agent_defaults() {
        let agent = NewAgent::auto_created("EmailAgent");
        assert_eq!(agent.slug, "email");
        assert_eq!(agent.kind, "COPILOT");
        assert_eq!(agent.status, "ACTIVE");
        assert_eq!(agent.description, "Auto-created agent for EmailAgent");
    }

    #[test]
    fn run_status_strings() {
        assert_eq!("success".parse::<RunStatus>().unwrap(), RunStatus::Success);
        assert!("COMPLETED".parse::<RunStatus>().is_err());
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert_eq!(
            serde_json::to_string(&RunStatus::Running).unwrap(),
            "\"running\""
        );
    }
}
