//! Ambient run context.
//!
//! [`run_with`] binds a [`RunContext`] for the dynamic extent of a future;
//! anything awaited inside it can call [`current`] without the context being
//! passed down explicitly. Bindings are task-local: concurrent tasks never
//! observe each other's context, and a nested `run_with` shadows the outer
//! binding until it completes (or unwinds).

use std::future::Future;
use std::sync::Arc;

use relay_state::{OrchestratorStore, RunId, TenantId};
use tokio::task::JoinHandle;

tokio::task_local! {
    static CURRENT_RUN: RunContext;
}

/// Identity of the run currently executing. Immutable once bound.
#[derive(Clone)]
pub struct RunContext {
    run_id: RunId,
    agent_id: String,
    agent_name: String,
    tenant_id: TenantId,
    store: Arc<dyn OrchestratorStore>,
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("agent_id", &self.agent_id)
            .field("agent_name", &self.agent_name)
            .field("tenant_id", &self.tenant_id)
            .finish_non_exhaustive()
    }
}

impl RunContext {
    pub fn new(
        run_id: RunId,
        agent_id: impl Into<String>,
        agent_name: impl Into<String>,
        tenant_id: TenantId,
        store: Arc<dyn OrchestratorStore>,
    ) -> Self {
        Self {
            run_id,
            agent_id: agent_id.into(),
            agent_name: agent_name.into(),
            tenant_id,
            store,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Durable agent record id.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// Store the run is being recorded in.
    pub fn store(&self) -> &Arc<dyn OrchestratorStore> {
        &self.store
    }
}

/// Run `fut` with `ctx` bound as the current run context.
pub async fn run_with<F>(ctx: RunContext, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT_RUN.scope(ctx, fut).await
}

/// The context bound by the innermost enclosing [`run_with`], if any.
pub fn current() -> Option<RunContext> {
    CURRENT_RUN.try_with(Clone::clone).ok()
}

/// Spawn `fut` on the runtime, carrying the current run context (if any) into
/// the new task.
pub fn spawn_in_current<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match current() {
        Some(ctx) => tokio::spawn(CURRENT_RUN.scope(ctx, fut)),
        None => tokio::spawn(fut),
    }
}
