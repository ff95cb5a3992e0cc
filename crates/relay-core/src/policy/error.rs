//! Error types for the execution policy layer.

use std::time::Duration;

use crate::domain::AgentId;

/// A fault raised by a handler.
///
/// Keeps the full cause chain so run records can carry it as a stack.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct AgentFault {
    message: String,
    #[source]
    cause: Option<Box<AgentFault>>,
}

impl AgentFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    /// Wrap `cause` (and everything it was caused by) under `message`.
    pub fn caused_by(
        message: impl Into<String>,
        cause: &(dyn std::error::Error + 'static),
    ) -> Self {
        Self {
            message: message.into(),
            cause: Some(Box::new(Self::from_chain(error_chain(cause)))),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    fn from_chain(messages: Vec<String>) -> Self {
        let mut iter = messages.into_iter().rev();
        let mut fault = AgentFault::new(iter.next().unwrap_or_default());
        for message in iter {
            fault = AgentFault {
                message,
                cause: Some(Box::new(fault)),
            };
        }
        fault
    }
}

impl From<anyhow::Error> for AgentFault {
    fn from(err: anyhow::Error) -> Self {
        Self::from_chain(err.chain().map(ToString::to_string).collect())
    }
}

impl From<String> for AgentFault {
    fn from(message: String) -> Self {
        AgentFault::new(message)
    }
}

impl From<&str> for AgentFault {
    fn from(message: &str) -> Self {
        AgentFault::new(message)
    }
}

/// Messages of `err` and every error in its `source()` chain, outermost first.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> Vec<String> {
    let mut chain = vec![err.to_string()];
    let mut current = err.source();
    while let Some(source) = current {
        chain.push(source.to_string());
        current = source.source();
    }
    chain
}

/// Errors produced while executing a handler under retry and circuit-breaker control.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    #[error("circuit breaker open for {agent}: {failure_count} consecutive failures (retry in {retry_after:?})")]
    CircuitOpen {
        agent: AgentId,
        failure_count: u32,
        retry_after: Duration,
    },

    #[error(transparent)]
    Fault(#[from] AgentFault),
}

impl ExecutionError {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ExecutionError::CircuitOpen { .. })
    }
}

/// Result type for policy-guarded execution.
pub type ExecutionResult<T> = std::result::Result<T, ExecutionError>;
