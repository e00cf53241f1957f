//! External capabilities the reasoning step may call.
//!
//! Every capability is a named handler behind [`Capability`]; the engine
//! never branches on names, it dispatches through [`CapabilityRegistry`].

mod document;
mod registry;
mod search;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::llm::ToolDefinition;

pub use document::{ARTIFACT_ROUTE_PREFIX, DATE_PLAN_CAPABILITY, DatePlanCapability};
pub use registry::{CapabilityRegistry, Invocation};
pub use search::{SEARCH_CAPABILITY, SearchCapability};

/// What a capability is for. The turn policy cares about `Search`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    Search,
    DocumentGeneration,
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapabilityKind::Search => write!(f, "search"),
            CapabilityKind::DocumentGeneration => write!(f, "document_generation"),
        }
    }
}

/// Successful capability output.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityResult {
    /// Text handed back to the model as the tool result.
    pub content: String,
    /// Replacement for the arguments relayed downstream, if the capability
    /// produced something more useful than the raw request.
    pub relayed_arguments: Option<Value>,
}

impl CapabilityResult {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            relayed_arguments: None,
        }
    }
}

/// Capability failures. None of these abort a turn.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("unknown capability: {0}")]
    NotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("capability unavailable: {0}")]
    Unavailable(String),

    #[error("capability failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> CapabilityKind;

    /// Declaration sent to the model.
    fn definition(&self) -> ToolDefinition;

    async fn invoke(&self, arguments: &Value) -> Result<CapabilityResult, CapabilityError>;
}
