//! Domain models for Relay.
//!
//! - `AgentId` / `AgentHandler`: the closed agent set and its handler contract
//! - `OrchestratorRequest`: what callers ask for
//! - `OrchestratorResponse` / `ResponseEnvelope`: what they get back

pub mod agent;
pub mod error;
pub mod request;
pub mod response;

pub use agent::{handler_fn, AgentHandler, AgentId, FnHandler, UnknownAgent};
pub use error::{RelayError, Result};
pub use request::{OrchestratorRequest, RequestContext};
pub use response::{
    EnvelopeStatus, ErrorBody, ErrorCode, OrchestratorResponse, ResponseEnvelope, ResponseMeta,
};
