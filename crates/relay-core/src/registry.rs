//! Agent handler registry.
//!
//! Maps each [`AgentId`] to at most one handler plus registration metadata.
//! The registry never executes anything; the router looks handlers up here.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AgentHandler, AgentId};
use crate::obs;

/// Optional metadata supplied at registration time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationMeta {
    pub version: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl RegistrationMeta {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: Some(version.into()),
            capabilities: Vec::new(),
        }
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }
}

/// A registered handler.
#[derive(Clone)]
pub struct RegistryEntry {
    pub agent: AgentId,
    pub handler: Arc<dyn AgentHandler>,
    pub registered_at: DateTime<Utc>,
    pub version: Option<String>,
    pub capabilities: Vec<String>,
}

impl std::fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("agent", &self.agent)
            .field("registered_at", &self.registered_at)
            .field("version", &self.version)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct AgentRegistry {
    entries: RwLock<HashMap<AgentId, RegistryEntry>>,
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.list().iter().map(|e| e.agent).collect::<Vec<_>>())
            .finish()
    }
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<AgentId, RegistryEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<AgentId, RegistryEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handler` for `agent`, replacing any previous registration.
    pub fn register(&self, agent: AgentId, handler: Arc<dyn AgentHandler>, meta: RegistrationMeta) {
        let capabilities = meta.capabilities.len();
        let version = meta.version.clone();
        self.write().insert(
            agent,
            RegistryEntry {
                agent,
                handler,
                registered_at: Utc::now(),
                version: meta.version,
                capabilities: meta.capabilities,
            },
        );
        obs::emit_agent_registered(agent.as_str(), version.as_deref(), capabilities);
    }

    pub fn get(&self, agent: AgentId) -> Option<RegistryEntry> {
        self.read().get(&agent).cloned()
    }

    pub fn contains(&self, agent: AgentId) -> bool {
        self.read().contains_key(&agent)
    }

    /// All entries, sorted by agent name.
    pub fn list(&self) -> Vec<RegistryEntry> {
        let mut entries: Vec<RegistryEntry> = self.read().values().cloned().collect();
        entries.sort_by(|a, b| a.agent.as_str().cmp(b.agent.as_str()));
        entries
    }

    /// Remove the registration for `agent`. Returns whether one existed.
    pub fn unregister(&self, agent: AgentId) -> bool {
        self.write().remove(&agent).is_some()
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{handler_fn, OrchestratorRequest, OrchestratorResponse};
    use serde_json::json;

    fn echo(tag: &'static str) -> Arc<dyn AgentHandler> {
        Arc::new(handler_fn(move |_req: OrchestratorRequest| async move {
            Ok(OrchestratorResponse::success(json!(tag)))
        }))
    }

    #[test]
    fn register_and_lookup() {
        let registry = AgentRegistry::new();
        assert!(registry.is_empty());
        registry.register(
            AgentId::Email,
            echo("email"),
            RegistrationMeta::new("1.2.0").with_capability("sequences"),
        );

        let entry = registry.get(AgentId::Email).unwrap();
        assert_eq!(entry.version.as_deref(), Some("1.2.0"));
        assert_eq!(entry.capabilities, vec!["sequences".to_string()]);
        assert!(registry.get(AgentId::Seo).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn reregistration_replaces_handler_and_metadata() {
        let registry = AgentRegistry::new();
        registry.register(AgentId::Content, echo("v1"), RegistrationMeta::new("1.0.0"));
        let first = registry.get(AgentId::Content).unwrap().registered_at;

        registry.register(AgentId::Content, echo("v2"), RegistrationMeta::default());
        let entry = registry.get(AgentId::Content).unwrap();
        assert!(entry.registered_at >= first);
        assert!(entry.version.is_none());
        assert_eq!(registry.len(), 1);

        let res = entry
            .handler
            .handle(&OrchestratorRequest::new("summarize"))
            .await
            .unwrap();
        assert_eq!(res.data(), Some(&json!("v2")));
    }

    #[test]
    fn list_is_sorted_by_name() {
        let registry = AgentRegistry::new();
        for agent in [AgentId::Support, AgentId::Content, AgentId::Seo, AgentId::Email] {
            registry.register(agent, echo("x"), RegistrationMeta::default());
        }
        let names: Vec<&str> = registry.list().iter().map(|e| e.agent.as_str()).collect();
        assert_eq!(names, vec!["ContentAgent", "EmailAgent", "SEOAgent", "SupportAgent"]);
    }

    #[test]
    fn unregister_and_clear() {
        let registry = AgentRegistry::new();
        registry.register(AgentId::Social, echo("s"), RegistrationMeta::default());
        registry.register(AgentId::Campaign, echo("c"), RegistrationMeta::default());

        assert!(registry.unregister(AgentId::Social));
        assert!(!registry.unregister(AgentId::Social));
        assert!(!registry.contains(AgentId::Social));

        registry.clear();
        assert!(registry.is_empty());
    }
}
