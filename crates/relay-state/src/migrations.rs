//! SurrealDB schema migrations and initialization
//!
//! Sets up the `agents` and `agent_runs` tables with their uniqueness
//! constraints and lookup indexes.

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all Relay tables in SurrealDB
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing Relay SurrealDB schema");

    init_agents_table(db).await?;
    init_agent_runs_table(db).await?;

    info!("Relay schema initialization complete");
    Ok(())
}

/// Initialize `agents` table
///
/// Schema:
/// ```text
/// TABLE agents {
///   agent_id:    STRING (unique)
///   tenant_id:   STRING
///   name:        STRING
///   slug:        STRING
///   kind:        STRING
///   status:      STRING
///   description: STRING
///   config:      OBJECT
///   created_at:  DATETIME
/// }
/// ```
///
/// Constraints:
/// - `(tenant_id, name)` is unique: one agent record per tenant and agent
async fn init_agents_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing agents table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS agents AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_agent_id ON TABLE agents COLUMNS agent_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_tenant_name ON TABLE agents COLUMNS tenant_id, name UNIQUE;
    "#;

    db.query(sql).await?.check()?;
    info!("agents table initialized");
    Ok(())
}

/// Initialize `agent_runs` table
///
/// Schema:
/// ```text
/// TABLE agent_runs {
///   run_id:       STRING (unique)
///   agent_id:     STRING (indexed)
///   tenant_id:    STRING (indexed)
///   status:       STRING (running | success | failed)
///   input:        ANY
///   output:       ANY?
///   metrics:      OBJECT
///   started_at:   DATETIME
///   completed_at: DATETIME?
/// }
/// ```
///
/// `status` transitions running → success | failed are enforced in
/// application logic; terminal rows are never updated again.
async fn init_agent_runs_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing agent_runs table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS agent_runs AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_run_id ON TABLE agent_runs COLUMNS run_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_run_tenant ON TABLE agent_runs COLUMNS tenant_id;
        DEFINE INDEX IF NOT EXISTS idx_run_agent ON TABLE agent_runs COLUMNS agent_id;
        DEFINE INDEX IF NOT EXISTS idx_run_tenant_started ON TABLE agent_runs COLUMNS tenant_id, started_at;
    "#;

    db.query(sql).await?.check()?;
    info!("agent_runs table initialized");
    Ok(())
}
