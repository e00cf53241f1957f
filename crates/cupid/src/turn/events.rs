//! Events emitted during a turn and the errors that end one.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::llm::LLMError;
use crate::store::StorageError;

/// One step of a turn, in emission order.
///
/// A turn's sequence holds exactly one terminal event (`TurnComplete` or
/// `TurnFailed`) and it is always last.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// The model called a capability. For document generation the arguments
    /// carry the produced artifact descriptor.
    CapabilityInvoked { name: String, arguments: Value },
    /// A fragment of the assistant reply.
    TextChunk { text: String },
    TurnComplete,
    TurnFailed { reason: String },
}

impl TurnEvent {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnEvent::TurnComplete | TurnEvent::TurnFailed { .. })
    }
}

/// Errors that terminate a turn.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The reasoning step failed (network, API or protocol error).
    #[error("reasoning failed: {0}")]
    ReasoningFailure(String),

    #[error("timeout")]
    Timeout,

    #[error("history could not be recorded: {0}")]
    Storage(String),

    /// The streaming client went away and the turn was configured to stop.
    #[error("client disconnected")]
    Disconnected,

    /// A terminal failure observed downstream, carrying its reason verbatim.
    #[error("{0}")]
    Failed(String),
}

impl From<StorageError> for TurnError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { id, .. } => TurnError::SessionNotFound(id),
            other => TurnError::Storage(other.to_string()),
        }
    }
}

impl From<LLMError> for TurnError {
    fn from(err: LLMError) -> Self {
        TurnError::ReasoningFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_events() {
        assert!(TurnEvent::TurnComplete.is_terminal());
        assert!(TurnEvent::TurnFailed { reason: "x".into() }.is_terminal());
        assert!(!TurnEvent::TextChunk { text: "x".into() }.is_terminal());
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_value(TurnEvent::TextChunk { text: "hi".into() }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "text_chunk", "text": "hi"}));
    }

    #[test]
    fn storage_not_found_maps_to_session_not_found() {
        let err: TurnError = StorageError::session_not_found("session_x").into();
        assert!(matches!(err, TurnError::SessionNotFound(id) if id == "session_x"));
        assert_eq!(TurnError::Timeout.to_string(), "timeout");
    }
}
