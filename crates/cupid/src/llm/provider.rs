use async_trait::async_trait;

use super::error::LLMError;
use super::types::{ChatRequest, ChatStream};

/// A model that turns a prompt plus declared tools into a stream of events.
///
/// One call is one reasoning round trip. The returned stream ends with
/// [`StreamEvent::Done`](super::StreamEvent::Done) on success; an `Err` item
/// at any point means the round trip failed.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream, LLMError>;
}
