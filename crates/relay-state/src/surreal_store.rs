//! SurrealDB-backed `AgentStore` + `RunStore` implementation
//!
//! Uses `schema::AgentRow` and `schema::RunRow` for persistence,
//! converting to/from `storage_traits` types at the boundary.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::config::{StoreConfig, DEFAULT_DATABASE, DEFAULT_NAMESPACE};
use crate::error::{StateError, StorageError};
use crate::migrations;
use crate::schema::{AgentRow, RunRow};
use crate::storage_traits::{
    AgentRecord, AgentStore, NewAgent, NewRun, RunId, RunRecord, RunStatus, RunStore,
    StorageResult, TenantId,
};

fn backend(e: surrealdb::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

/// SurrealDB-backed implementation of [`AgentStore`] and [`RunStore`].
#[derive(Clone)]
pub struct SurrealStore {
    db: Surreal<Any>,
}

impl SurrealStore {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `relay/main`, and runs `init_schema`.
    pub async fn in_memory() -> crate::Result<Self> {
        let store = Self::open_url("mem://").await?;
        info!("SurrealStore connected (in-memory)");
        Ok(store)
    }

    /// Open (or create) a local SurrealKV database at `path`.
    pub async fn open_local(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path).map_err(|e| {
            StateError::Connection(format!(
                "Failed to create database directory {}: {}",
                path.display(),
                e
            ))
        })?;
        let url = format!("surrealkv://{}", path.display());
        let store = Self::open_url(&url).await?;
        info!("SurrealStore connected ({})", url);
        Ok(store)
    }

    /// Connect to a remote SurrealDB with credentials.
    #[instrument(skip(config), fields(endpoint = %config.endpoint, namespace = %config.namespace, database = %config.database))]
    pub async fn connect(config: &StoreConfig) -> crate::Result<Self> {
        let db = surrealdb::engine::any::connect(&config.endpoint)
            .await
            .map_err(|e| {
                StateError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
            })?;

        if config.is_root {
            db.signin(Root {
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("Root auth failed: {e}")))?;
        } else {
            db.signin(Database {
                namespace: &config.namespace,
                database: &config.database,
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("DB auth failed: {e}")))?;
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        info!("SurrealStore connected (remote)");
        Ok(Self { db })
    }

    /// Create from environment variables.
    ///
    /// Resolution order: [`StoreConfig::from_env`] credentials, then
    /// `SURREALDB_URL`, then local persistence under `.relay/db`.
    pub async fn from_env() -> crate::Result<Self> {
        if let Ok(config) = StoreConfig::from_env() {
            return Self::connect(&config).await;
        }

        if let Ok(url) = std::env::var("SURREALDB_URL") {
            let store = Self::open_url(&url).await?;
            info!("SurrealStore connected ({})", url);
            return Ok(store);
        }

        info!("No remote config or SURREALDB_URL found, using local persistence: .relay/db");
        Self::open_local(".relay/db").await
    }

    async fn open_url(url: &str) -> crate::Result<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

        db.use_ns(DEFAULT_NAMESPACE)
            .use_db(DEFAULT_DATABASE)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        Ok(Self { db })
    }

    // -- private helpers -----------------------------------------------------

    /// Fetch a run row by ID, returning the DB row or RunNotFound.
    async fn fetch_run(&self, rid: &str) -> StorageResult<RunRow> {
        let mut res = self
            .db
            .query("SELECT * FROM agent_runs WHERE run_id = $rid")
            .bind(("rid", rid.to_string()))
            .await
            .map_err(backend)?;

        let rows: Vec<RunRow> = res.take(0).map_err(backend)?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: rid.to_string(),
            })
    }

    /// Fetch a run row and verify it is in "running" state.
    async fn fetch_running(&self, rid: &str) -> StorageResult<RunRow> {
        let row = self.fetch_run(rid).await?;
        if row.status != RunStatus::Running.as_str() {
            return Err(StorageError::InvalidRunState {
                run_id: rid.to_string(),
                status: row.status,
                expected: RunStatus::Running.to_string(),
            });
        }
        Ok(row)
    }

    async fn write_run(&self, row: RunRow) -> StorageResult<()> {
        let rid = row.run_id.clone();
        self.db
            .query("UPDATE agent_runs CONTENT $row WHERE run_id = $rid")
            .bind(("row", row))
            .bind(("rid", rid))
            .await
            .map_err(backend)?
            .check()
            .map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl AgentStore for SurrealStore {
    async fn find_agent(
        &self,
        tenant: &TenantId,
        name: &str,
    ) -> StorageResult<Option<AgentRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM agents WHERE tenant_id = $tenant AND name = $name")
            .bind(("tenant", tenant.as_str().to_string()))
            .bind(("name", name.to_string()))
            .await
            .map_err(backend)?;

        let rows: Vec<AgentRow> = res.take(0).map_err(backend)?;
        rows.into_iter().next().map(AgentRow::into_record).transpose()
    }

    async fn create_agent(
        &self,
        tenant: &TenantId,
        agent: NewAgent,
    ) -> StorageResult<AgentRecord> {
        let name = agent.name.clone();
        let row = AgentRow::new(tenant, agent);
        debug!(tenant_id = %tenant, agent_name = %name, "creating agent");

        let created: Result<Option<AgentRow>, _> = self.db.create("agents").content(row).await;
        match created {
            Ok(Some(row)) => row.into_record(),
            Ok(None) => Err(StorageError::Backend(
                "agent create returned no row".to_string(),
            )),
            // Unique (tenant_id, name) index: a concurrent creator got there first.
            Err(e) => match self.find_agent(tenant, &name).await? {
                Some(existing) => Ok(existing),
                None => Err(backend(e)),
            },
        }
    }
}

#[async_trait]
impl RunStore for SurrealStore {
    async fn create_run(&self, run: NewRun) -> StorageResult<RunRecord> {
        let run_id = RunId::new();
        let row = RunRow::new(&run_id, run);

        debug!(run_id = %run_id, "creating run");

        let created: Option<RunRow> = self
            .db
            .create("agent_runs")
            .content(row)
            .await
            .map_err(backend)?;

        created
            .ok_or_else(|| StorageError::Backend("run create returned no row".to_string()))?
            .into_record()
    }

    async fn complete_run(
        &self,
        run_id: &RunId,
        output: Value,
        metrics: Value,
        completed_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let row = self.fetch_running(&run_id.0).await?;
        self.write_run(row.succeed(output, metrics, completed_at))
            .await
    }

    async fn fail_run(
        &self,
        run_id: &RunId,
        metrics: Value,
        completed_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let row = self.fetch_running(&run_id.0).await?;
        self.write_run(row.fail(metrics, completed_at)).await
    }

    async fn get_run(&self, run_id: &RunId) -> StorageResult<RunRecord> {
        self.fetch_run(&run_id.0).await?.into_record()
    }

    async fn list_runs(
        &self,
        tenant: &TenantId,
        agent_id: Option<&str>,
    ) -> StorageResult<Vec<RunRecord>> {
        let tenant_owned = tenant.as_str().to_string();
        let rows: Vec<RunRow> = if let Some(agent_id) = agent_id {
            let mut res = self
                .db
                .query(
                    "SELECT * FROM agent_runs WHERE tenant_id = $tenant AND agent_id = $agent \
                     ORDER BY started_at DESC",
                )
                .bind(("tenant", tenant_owned))
                .bind(("agent", agent_id.to_string()))
                .await
                .map_err(backend)?;
            res.take(0).map_err(backend)?
        } else {
            let mut res = self
                .db
                .query("SELECT * FROM agent_runs WHERE tenant_id = $tenant ORDER BY started_at DESC")
                .bind(("tenant", tenant_owned))
                .await
                .map_err(backend)?;
            res.take(0).map_err(backend)?
        };

        rows.into_iter().map(RunRow::into_record).collect()
    }
}
