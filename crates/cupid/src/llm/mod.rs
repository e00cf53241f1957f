//! Client for the reasoning capability.
//!
//! The engine talks to an [`LLMProvider`]; the production implementation is
//! an OpenAI-compatible chat completions endpoint.

mod error;
mod openai;
mod provider;
mod types;

pub use error::LLMError;
pub use openai::OpenAICompatibleProvider;
pub use provider::LLMProvider;
pub use types::{
    ChatMessage, ChatRequest, ChatStream, FunctionCall, FunctionDefinition, Role, StreamEvent,
    ToolCall, ToolDefinition, Usage,
};
