//! Reasoning capability errors.

use thiserror::Error;

/// Failures talking to the model. Every variant is fatal to the turn.
#[derive(Debug, Error)]
pub enum LLMError {
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The stream ended or produced data that does not follow the protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
}
