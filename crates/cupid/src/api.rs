//! Wire types shared by handlers and clients.
//!
//! Changes here change the HTTP contract.

use serde::{Deserialize, Serialize};

use crate::store::{Message, MessageRole};

// ============================================================================
// Identifiers and Defaults
// ============================================================================

/// Prefix of every generated session id.
pub const SESSION_ID_PREFIX: &str = "session_";

/// User id assumed when a request omits one.
pub const DEFAULT_USER_ID: &str = "user";

/// App name assumed when a request omits one.
pub const DEFAULT_APP_NAME: &str = "agent";

fn default_user_id() -> String {
    DEFAULT_USER_ID.to_string()
}

fn default_app_name() -> String {
    DEFAULT_APP_NAME.to_string()
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Stream Frame Types
// ============================================================================

/// One frame of a streamed turn, serialized as the SSE `data` payload.
///
/// A stream is always `session_id`, then any `message` frames, then an
/// optional `error`, then exactly one `done`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    SessionId { session_id: String },
    Message { content: String },
    Error { error: String },
    Done,
}

// ============================================================================
// Turn Requests
// ============================================================================

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    pub message: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    /// Must match the app the session was created under.
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default = "default_true")]
    pub stream: bool,
}

/// Response of a buffered turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferedReply {
    pub session_id: String,
    pub message: String,
    pub user_id: String,
}

// ============================================================================
// Sessions
// ============================================================================

/// Body of `POST /api/create_session`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_app_name")]
    pub app_name: String,
}

impl Default for CreateSessionRequest {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            app_name: default_app_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub user_id: String,
    pub app_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: String,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self {
            role: message.role,
            content: message.content,
            timestamp: message.timestamp.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub messages: Vec<MessageResponse>,
}

// ============================================================================
// Documents and Artifacts
// ============================================================================

/// Result handed back to the reasoning step after a document request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResponse {
    pub success: bool,
    pub artifact_id: String,
    pub display_name: String,
    pub message: String,
}

/// One row of `GET /api/artifacts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub name: String,
    pub size: u64,
    pub created_at: String,
    pub download_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactListResponse {
    pub artifacts: Vec<ArtifactSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_request_defaults() {
        let req: TurnRequest = serde_json::from_str(r#"{"message":"你好"}"#).unwrap();
        assert_eq!(req.user_id, "user");
        assert_eq!(req.app_name, "agent");
        assert!(req.session_id.is_none());
        assert!(req.stream);
    }

    #[test]
    fn create_session_request_defaults() {
        let req: CreateSessionRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.user_id, "user");
        assert_eq!(req.app_name, "agent");
    }

    #[test]
    fn stream_frames_use_type_tag() {
        let frames = [
            StreamFrame::SessionId { session_id: "session_1".into() },
            StreamFrame::Message { content: "嗨".into() },
            StreamFrame::Error { error: "timeout".into() },
            StreamFrame::Done,
        ];
        let json: Vec<_> = frames.iter().map(|f| serde_json::to_string(f).unwrap()).collect();
        assert_eq!(
            json,
            [
                r#"{"type":"session_id","session_id":"session_1"}"#,
                r#"{"type":"message","content":"嗨"}"#,
                r#"{"type":"error","error":"timeout"}"#,
                r#"{"type":"done"}"#,
            ]
        );
    }
}
