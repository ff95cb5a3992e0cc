//! Inbound orchestration requests.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Caller-supplied context. Unknown keys are preserved in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RequestContext {
    /// Authenticated caller, if a non-blank `userId` was supplied.
    pub fn caller_id(&self) -> Option<&str> {
        non_blank(self.user_id.as_deref())
    }

    /// Tenant (organization) the request runs under, if any.
    pub fn tenant_id(&self) -> Option<&str> {
        non_blank(self.organization_id.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// A logical request: run `intent`, optionally on a named agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    pub intent: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub context: RequestContext,
}

impl OrchestratorRequest {
    pub fn new(intent: impl Into<String>) -> Self {
        Self {
            agent: None,
            intent: intent.into(),
            payload: Value::Null,
            context: RequestContext::default(),
        }
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.context.user_id = Some(user_id.into());
        self
    }

    pub fn with_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.context.organization_id = Some(organization_id.into());
        self
    }

    /// Caller-provided agent token, ignoring blank strings.
    pub fn provided_agent(&self) -> Option<&str> {
        non_blank(self.agent.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn context_parses_camel_case_and_keeps_extra_keys() {
        let req: OrchestratorRequest = serde_json::from_value(json!({
            "agent": "ContentAgent",
            "intent": "generate-draft",
            "payload": {"topic": "rust"},
            "context": {"userId": "u1", "organizationId": "org1", "locale": "en-GB"}
        }))
        .unwrap();

        assert_eq!(req.context.caller_id(), Some("u1"));
        assert_eq!(req.context.tenant_id(), Some("org1"));
        assert_eq!(req.context.extra["locale"], "en-GB");

        let back = serde_json::to_value(&req).unwrap();
        assert_eq!(back["context"]["locale"], "en-GB");
        assert_eq!(back["context"]["userId"], "u1");
    }

    #[test]
    fn missing_fields_default() {
        let req: OrchestratorRequest =
            serde_json::from_value(json!({"intent": "summarize"})).unwrap();
        assert!(req.agent.is_none());
        assert_eq!(req.payload, Value::Null);
        assert!(req.context.caller_id().is_none());
    }

    #[test]
    fn blank_identifiers_count_as_absent() {
        let req = OrchestratorRequest::new("triage")
            .with_agent("  ")
            .with_user("")
            .with_organization("   ");
        assert!(req.provided_agent().is_none());
        assert!(req.context.caller_id().is_none());
        assert!(req.context.tenant_id().is_none());
    }
}
