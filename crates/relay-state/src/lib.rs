//! Relay-State: durable records for the Relay agent orchestrator
//!
//! This crate owns everything the orchestrator persists: one agent record per
//! (tenant, agent name) and one run record per tracked agent invocation.
//!
//! ## Key Components
//!
//! - `AgentStore` / `RunStore`: backend-agnostic async traits
//! - `SurrealStore`: SurrealDB implementation (mem://, surrealkv://, ws/wss)
//! - `MemoryStore`: in-memory fake for tests and local runs

mod config;
mod error;
pub mod fakes;
mod migrations;
pub mod schema;
pub mod storage_traits;
mod surreal_store;

pub use config::StoreConfig;
pub use error::{StateError, StorageError};
pub use fakes::MemoryStore;
pub use migrations::init_schema;
pub use schema::{AgentRow, RunRow};
pub use storage_traits::{
    slug_for, AgentRecord, AgentStore, NewAgent, NewRun, OrchestratorStore, RunId, RunRecord,
    RunStatus, RunStore, StorageResult, TenantId,
};
pub use surreal_store::SurrealStore;

/// Result type for relay-state operations
pub type Result<T> = std::result::Result<T, StateError>;
