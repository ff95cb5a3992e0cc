//! Orchestration outcomes and the uniform wire envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Stable error taxonomy shared by every failure path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    AgentRequired,
    IntentAgentMismatch,
    AgentNotRegistered,
    Unauthenticated,
    RateLimited,
    CircuitOpen,
    AgentExecutionFailed,
    ValidationFailed,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::AgentRequired => "AGENT_REQUIRED",
            ErrorCode::IntentAgentMismatch => "INTENT_AGENT_MISMATCH",
            ErrorCode::AgentNotRegistered => "AGENT_NOT_REGISTERED",
            ErrorCode::Unauthenticated => "UNAUTHENTICATED",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::CircuitOpen => "CIRCUIT_OPEN",
            ErrorCode::AgentExecutionFailed => "AGENT_EXECUTION_FAILED",
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }

    /// HTTP status for transports that need one.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::Unauthenticated => 401,
            ErrorCode::RateLimited => 429,
            ErrorCode::AgentNotRegistered => 404,
            ErrorCode::CircuitOpen | ErrorCode::AgentExecutionFailed => 502,
            _ => 400,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Annotations attached to a response as it travels back through the router.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metrics: Map<String, Value>,
}

impl ResponseMeta {
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metrics.insert(key.into(), value.into());
        self
    }

    /// Fill in whatever `other` knows that `self` does not.
    ///
    /// Fields and metric keys already present are kept as they are.
    pub fn merge(&mut self, other: ResponseMeta) {
        if self.agent.is_none() {
            self.agent = other.agent;
        }
        if self.intent.is_none() {
            self.intent = other.intent;
        }
        if self.run_id.is_none() {
            self.run_id = other.run_id;
        }
        for (key, value) in other.metrics {
            self.metrics.entry(key).or_insert(value);
        }
    }
}

/// Outcome of a routed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OrchestratorResponse {
    Success {
        data: Value,
        #[serde(default)]
        meta: ResponseMeta,
    },
    Failure {
        error: ErrorBody,
        #[serde(default)]
        meta: ResponseMeta,
    },
}

impl OrchestratorResponse {
    pub fn success(data: Value) -> Self {
        OrchestratorResponse::Success {
            data,
            meta: ResponseMeta::default(),
        }
    }

    pub fn failure(code: ErrorCode, message: impl Into<String>) -> Self {
        OrchestratorResponse::Failure {
            error: ErrorBody {
                code,
                message: message.into(),
                details: None,
            },
            meta: ResponseMeta::default(),
        }
    }

    /// Attach structured details to a failure. No-op on success.
    pub fn with_details(mut self, details: Value) -> Self {
        if let OrchestratorResponse::Failure { error, .. } = &mut self {
            error.details = Some(details);
        }
        self
    }

    /// Additively merge `meta` into this response's annotations.
    pub fn merge_meta(mut self, meta: ResponseMeta) -> Self {
        self.meta_mut().merge(meta);
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OrchestratorResponse::Success { .. })
    }

    pub fn meta(&self) -> &ResponseMeta {
        match self {
            OrchestratorResponse::Success { meta, .. }
            | OrchestratorResponse::Failure { meta, .. } => meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut ResponseMeta {
        match self {
            OrchestratorResponse::Success { meta, .. }
            | OrchestratorResponse::Failure { meta, .. } => meta,
        }
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            OrchestratorResponse::Success { data, .. } => Some(data),
            OrchestratorResponse::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorBody> {
        match self {
            OrchestratorResponse::Success { .. } => None,
            OrchestratorResponse::Failure { error, .. } => Some(error),
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error().map(|e| e.code)
    }

    /// Flatten into the uniform wire envelope, stamped with the current time.
    pub fn into_envelope(self) -> ResponseEnvelope {
        self.into_envelope_at(Utc::now())
    }

    pub fn into_envelope_at(self, timestamp: DateTime<Utc>) -> ResponseEnvelope {
        let (success, data, error, meta) = match self {
            OrchestratorResponse::Success { data, meta } => (true, Some(data), None, meta),
            OrchestratorResponse::Failure { error, meta } => (false, None, Some(error), meta),
        };
        ResponseEnvelope {
            success,
            status: if success {
                EnvelopeStatus::Completed
            } else {
                EnvelopeStatus::Failed
            },
            agent: meta.agent,
            intent: meta.intent,
            run_id: meta.run_id,
            data,
            error,
            metrics: (!meta.metrics.is_empty()).then_some(meta.metrics),
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    Completed,
    Failed,
}

/// Uniform response shape handed to transports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub success: bool,
    pub status: EnvelopeStatus,
    pub agent: Option<String>,
    pub intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Map<String, Value>>,
    pub timestamp: DateTime<Utc>,
}

impl ResponseEnvelope {
    /// HTTP status for this envelope (200 on success).
    pub fn http_status(&self) -> u16 {
        self.error.as_ref().map(|e| e.code.http_status()).unwrap_or(200)
    }
}
