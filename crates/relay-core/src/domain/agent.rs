//! Agent identity and the handler contract.

use std::future::Future;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::request::OrchestratorRequest;
use super::response::OrchestratorResponse;
use crate::policy::AgentFault;

/// The closed set of agents the orchestrator can dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgentId {
    #[serde(rename = "ContentAgent")]
    Content,
    #[serde(rename = "SEOAgent")]
    Seo,
    #[serde(rename = "EmailAgent")]
    Email,
    #[serde(rename = "SocialAgent")]
    Social,
    #[serde(rename = "SupportAgent")]
    Support,
    #[serde(rename = "CampaignAgent")]
    Campaign,
}

impl AgentId {
    pub const ALL: [AgentId; 6] = [
        AgentId::Content,
        AgentId::Seo,
        AgentId::Email,
        AgentId::Social,
        AgentId::Support,
        AgentId::Campaign,
    ];

    /// Stable wire token, e.g. `"ContentAgent"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentId::Content => "ContentAgent",
            AgentId::Seo => "SEOAgent",
            AgentId::Email => "EmailAgent",
            AgentId::Social => "SocialAgent",
            AgentId::Support => "SupportAgent",
            AgentId::Campaign => "CampaignAgent",
        }
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a token does not name a known agent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown agent: {0}")]
pub struct UnknownAgent(pub String);

impl FromStr for AgentId {
    type Err = UnknownAgent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentId::ALL
            .into_iter()
            .find(|agent| agent.as_str() == s)
            .ok_or_else(|| UnknownAgent(s.to_string()))
    }
}

/// Business logic behind an agent.
///
/// A handler either returns a structured response (which may itself be a
/// `Failure`) or raises an [`AgentFault`]. Only raised faults are retried and
/// counted by the circuit breaker.
#[async_trait]
pub trait AgentHandler: Send + Sync {
    async fn handle(&self, request: &OrchestratorRequest)
        -> Result<OrchestratorResponse, AgentFault>;
}

/// Adapter turning an async closure into an [`AgentHandler`].
pub struct FnHandler<F> {
    f: F,
}

/// Build a handler from `Fn(OrchestratorRequest) -> impl Future<...>`.
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(OrchestratorRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<OrchestratorResponse, AgentFault>> + Send,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> AgentHandler for FnHandler<F>
where
    F: Fn(OrchestratorRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<OrchestratorResponse, AgentFault>> + Send,
{
    async fn handle(
        &self,
        request: &OrchestratorRequest,
    ) -> Result<OrchestratorResponse, AgentFault> {
        (self.f)(request.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_round_trip_through_from_str() {
        for agent in AgentId::ALL {
            assert_eq!(agent.as_str().parse::<AgentId>().unwrap(), agent);
        }
    }

    #[test]
    fn unknown_token_is_rejected() {
        let err = "PlannerAgent".parse::<AgentId>().unwrap_err();
        assert_eq!(err, UnknownAgent("PlannerAgent".to_string()));
        assert!("contentagent".parse::<AgentId>().is_err());
    }

    #[test]
    fn serde_uses_wire_tokens() {
        assert_eq!(
            serde_json::to_string(&AgentId::Seo).unwrap(),
            "\"SEOAgent\""
        );
        let parsed: AgentId = serde_json::from_str("\"SupportAgent\"").unwrap();
        assert_eq!(parsed, AgentId::Support);
    }

    #[tokio::test]
    async fn handler_fn_receives_request() {
        let handler = handler_fn(|req: OrchestratorRequest| async move {
            Ok(OrchestratorResponse::success(serde_json::json!({ "echo": req.intent })))
        });
        let res = handler
            .handle(&OrchestratorRequest::new("summarize"))
            .await
            .unwrap();
        assert_eq!(res.data(), Some(&serde_json::json!({ "echo": "summarize" })));
    }
}
