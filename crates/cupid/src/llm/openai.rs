//! OpenAI-compatible streaming provider.
//!
//! Works with any endpoint exposing `POST {base_url}/chat/completions` with
//! `stream: true` (OpenAI, DeepSeek, OpenRouter, Ollama, vLLM).

use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt, stream};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::LLMError;
use super::provider::LLMProvider;
use super::types::{
    ChatMessage, ChatRequest, ChatStream, StreamEvent, ToolCall, ToolDefinition, Usage,
};
use crate::sse_parser::SseEventStream;

pub struct OpenAICompatibleProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAICompatibleProvider {
    #[must_use]
    pub fn new(client: Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream, LLMError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = StreamRequest {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            tools: &request.tools,
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
        };

        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(LLMError::Api { status, message });
        }

        Ok(decode_stream(response.bytes_stream()))
    }
}

// ============================================================================
// Stream Decoding
// ============================================================================

/// Decode an SSE body of chat completion chunks into [`StreamEvent`]s.
///
/// Tool call fragments are accumulated by index and released as one
/// `ToolCalls` event, either on `finish_reason: tool_calls` or at the end.
/// A body that ends before any `finish_reason` or `[DONE]` was cut off and
/// yields a protocol error instead of `Done`.
pub(crate) fn decode_stream<S>(bytes: S) -> ChatStream
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin + Send + 'static,
{
    let decoder = ChunkDecoder {
        events: SseEventStream::new(bytes),
        partial_calls: Vec::new(),
        usage: None,
        ready: VecDeque::new(),
        completed: false,
        finished: false,
    };

    Box::pin(stream::unfold(decoder, |mut decoder| async move {
        loop {
            if let Some(event) = decoder.ready.pop_front() {
                return Some((Ok(event), decoder));
            }
            if decoder.finished {
                return None;
            }

            match decoder.events.next().await {
                Some(Ok(sse)) => decoder.ingest(&sse.data),
                Some(Err(e)) => {
                    decoder.finished = true;
                    return Some((Err(LLMError::Request(e)), decoder));
                }
                None if decoder.completed => decoder.finish(),
                None => {
                    decoder.finished = true;
                    return Some((
                        Err(LLMError::Protocol(
                            "response ended before a finish reason".to_string(),
                        )),
                        decoder,
                    ));
                }
            }
        }
    }))
}

struct ChunkDecoder<S> {
    events: SseEventStream<S>,
    partial_calls: Vec<PartialToolCall>,
    usage: Option<Usage>,
    ready: VecDeque<StreamEvent>,
    /// A `finish_reason` or `[DONE]` has been seen.
    completed: bool,
    finished: bool,
}

#[derive(Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl<S> ChunkDecoder<S> {
    fn ingest(&mut self, data: &str) {
        if data.is_empty() {
            return;
        }
        if data == "[DONE]" {
            self.completed = true;
            self.finish();
            return;
        }

        let chunk = match serde_json::from_str::<StreamChunk>(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!(error = %e, "skipping undecodable completion chunk");
                return;
            }
        };

        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return;
        };

        if let Some(content) = choice.delta.content
            && !content.is_empty()
        {
            self.ready.push_back(StreamEvent::Token(content));
        }

        for delta in choice.delta.tool_calls.unwrap_or_default() {
            if self.partial_calls.len() <= delta.index {
                self.partial_calls
                    .resize_with(delta.index + 1, PartialToolCall::default);
            }
            let partial = &mut self.partial_calls[delta.index];
            if let Some(id) = delta.id {
                partial.id = id;
            }
            if let Some(function) = delta.function {
                if let Some(name) = function.name {
                    partial.name = name;
                }
                if let Some(arguments) = function.arguments {
                    partial.arguments.push_str(&arguments);
                }
            }
        }

        match choice.finish_reason.as_deref() {
            Some("tool_calls") => {
                self.completed = true;
                self.flush_tool_calls();
            }
            Some(_) => self.completed = true,
            None => {}
        }
    }

    fn flush_tool_calls(&mut self) {
        let calls: Vec<ToolCall> = std::mem::take(&mut self.partial_calls)
            .into_iter()
            .filter(|p| !p.id.is_empty() && !p.name.is_empty())
            .map(|p| ToolCall::new(p.id, p.name, p.arguments))
            .collect();
        if !calls.is_empty() {
            self.ready.push_back(StreamEvent::ToolCalls(calls));
        }
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.flush_tool_calls();
        self.ready.push_back(StreamEvent::Done {
            usage: self.usage.take(),
        });
        self.finished = true;
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Serialize)]
struct StreamRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tools: &'a [ToolDefinition],
    stream: bool,
    stream_options: StreamOptions,
}

#[derive(Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}
