//! Session storage trait and the records it persists.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::SESSION_ID_PREFIX;

use super::error::{StorageError, StorageResult};

// ============================================================================
// Records
// ============================================================================

/// Identity of a conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub app_name: String,
    pub created_at: DateTime<Utc>,
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// One entry in a session's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Session ids are generated by the store; anything else is never a valid key.
///
/// Rejecting foreign shapes up front also keeps ids safe to use as path segments.
#[must_use]
pub fn is_valid_session_id(id: &str) -> bool {
    id.strip_prefix(SESSION_ID_PREFIX)
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric()))
}

// ============================================================================
// SessionStore Trait
// ============================================================================

/// Storage interface for conversation history.
///
/// Implementations must make `append` durable before returning and must keep
/// appends to a single session in commit order.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a fresh session with a newly generated id.
    async fn create(&self, user_id: &str, app_name: &str) -> StorageResult<Session>;

    /// Load a session's identity. `Ok(None)` when it does not exist.
    async fn load(&self, session_id: &str) -> StorageResult<Option<Session>>;

    /// Append a message to the session's history.
    ///
    /// Fails with `NotFound` if the session no longer exists.
    async fn append(&self, session_id: &str, message: &Message) -> StorageResult<()>;

    /// Return at most `limit` of the most recent messages, oldest first.
    async fn history(&self, session_id: &str, limit: usize) -> StorageResult<Vec<Message>>;

    /// Resolve a caller-supplied session, or create one when none was given.
    ///
    /// A supplied id that is unknown, or that belongs to another user or app,
    /// is reported as `NotFound`. Creation never fails with `NotFound`.
    async fn resolve_or_create(
        &self,
        user_id: &str,
        app_name: &str,
        session_id: Option<&str>,
    ) -> StorageResult<Session> {
        let Some(id) = session_id else {
            return self.create(user_id, app_name).await;
        };

        match self.load(id).await? {
            Some(session) if session.user_id == user_id && session.app_name == app_name => {
                Ok(session)
            }
            _ => Err(StorageError::session_not_found(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_generated_ids() {
        let id = format!("{}{}", SESSION_ID_PREFIX, ulid::Ulid::new());
        assert!(is_valid_session_id(&id));
    }

    #[test]
    fn rejects_foreign_ids() {
        assert!(!is_valid_session_id(""));
        assert!(!is_valid_session_id("session_"));
        assert!(!is_valid_session_id("abc123"));
        assert!(!is_valid_session_id("session_../../etc"));
        assert!(!is_valid_session_id("session_a/b"));
    }

    #[test]
    fn message_role_serializes_snake_case() {
        let msg = Message::assistant("hi");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"assistant\""));
        assert_eq!(MessageRole::Tool.to_string(), "tool");
    }
}
