//! Intent → agent resolution.
//!
//! A known intent is authoritative: the mapped agent runs, and a caller that
//! names a different agent is rejected. Unknown intents fall back to the
//! agent the caller named.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::domain::{AgentId, ErrorCode};

/// Intents understood by the built-in agents.
pub const STANDARD_INTENTS: &[(&str, AgentId)] = &[
    ("generate-draft", AgentId::Content),
    ("summarize", AgentId::Content),
    ("repurpose", AgentId::Content),
    ("keyword-research", AgentId::Seo),
    ("seo-audit", AgentId::Seo),
    ("generate-sequence", AgentId::Email),
    ("optimize-subject", AgentId::Email),
    ("ab-test", AgentId::Email),
    ("generate-post", AgentId::Social),
    ("optimize-caption", AgentId::Social),
    ("hashtag-pack", AgentId::Social),
    ("support", AgentId::Support),
    ("triage", AgentId::Support),
    ("macro-suggest", AgentId::Support),
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntentError {
    #[error("no agent specified and intent '{intent}' is not mapped to one")]
    AgentRequired { intent: String },

    #[error("intent '{intent}' is handled by {expected}, not {provided}")]
    Mismatch {
        intent: String,
        expected: AgentId,
        provided: String,
    },

    #[error("agent '{0}' is not registered")]
    UnknownAgent(String),
}

impl IntentError {
    pub fn code(&self) -> ErrorCode {
        match self {
            IntentError::AgentRequired { .. } => ErrorCode::AgentRequired,
            IntentError::Mismatch { .. } => ErrorCode::IntentAgentMismatch,
            IntentError::UnknownAgent(_) => ErrorCode::AgentNotRegistered,
        }
    }

    /// Structured details for the failure envelope.
    pub fn details(&self) -> Option<Value> {
        match self {
            IntentError::Mismatch { expected, .. } => {
                Some(json!({ "expected": expected.as_str() }))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IntentResolver {
    mappings: BTreeMap<String, AgentId>,
}

impl IntentResolver {
    /// Resolver preloaded with [`STANDARD_INTENTS`].
    pub fn standard() -> Self {
        STANDARD_INTENTS
            .iter()
            .fold(Self::empty(), |r, (intent, agent)| r.with_mapping(*intent, *agent))
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Add or replace the mapping for `intent`.
    pub fn with_mapping(mut self, intent: impl Into<String>, agent: AgentId) -> Self {
        self.mappings.insert(intent.into(), agent);
        self
    }

    pub fn lookup(&self, intent: &str) -> Option<AgentId> {
        self.mappings.get(intent).copied()
    }

    pub fn mappings(&self) -> &BTreeMap<String, AgentId> {
        &self.mappings
    }

    /// Decide which agent serves `intent`, given the caller's optional choice.
    pub fn resolve(&self, intent: &str, provided: Option<&str>) -> Result<AgentId, IntentError> {
        match (self.lookup(intent), provided) {
            (Some(expected), Some(provided)) => match provided.parse::<AgentId>() {
                Ok(agent) if agent == expected => Ok(agent),
                _ => Err(IntentError::Mismatch {
                    intent: intent.to_string(),
                    expected,
                    provided: provided.to_string(),
                }),
            },
            (Some(expected), None) => Ok(expected),
            (None, Some(provided)) => provided
                .parse::<AgentId>()
                .map_err(|e| IntentError::UnknownAgent(e.0)),
            (None, None) => Err(IntentError::AgentRequired {
                intent: intent.to_string(),
            }),
        }
    }
}
