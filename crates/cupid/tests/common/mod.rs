//! Common test utilities.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use futures::stream::{self, StreamExt};
use serde_json::{Value, json};

use cupid::capability::{
    Capability, CapabilityError, CapabilityKind, CapabilityRegistry, CapabilityResult,
    DatePlanCapability, SEARCH_CAPABILITY,
};
use cupid::config::TurnConfig;
use cupid::document::{DocumentGateway, FileArtifactStore};
use cupid::knowledge::Instructions;
use cupid::llm::{
    ChatRequest, ChatStream, LLMError, LLMProvider, Role, StreamEvent, ToolCall, ToolDefinition,
};
use cupid::server::{self, AppState};
use cupid::store::SessionStore;
use cupid::store::file::FileSessionStore;
use cupid::turn::{EngineSettings, MANDATORY_SEARCH_DIRECTIVE, TurnEngine};

/// Reply to a message that needed no capability.
pub const GREETING_REPLY: &str = "你好呀！今天想聊点什么？";

/// Reply after at least one capability result.
pub const ADVICE_REPLY: &str = "先深呼吸，再试着好好沟通。";

const GREETING_TOKENS: [&str; 2] = ["你好呀！", "今天想聊点什么？"];
const ADVICE_TOKENS: [&str; 3] = ["先深呼吸，", "再试着", "好好沟通。"];

// ============================================================================
// Provider Doubles
// ============================================================================

fn boxed(events: Vec<Result<StreamEvent, LLMError>>) -> ChatStream {
    Box::pin(stream::iter(events))
}

fn done() -> StreamEvent {
    StreamEvent::Done { usage: None }
}

fn tokens(parts: &[&str]) -> Vec<StreamEvent> {
    parts
        .iter()
        .map(|t| StreamEvent::Token((*t).to_string()))
        .chain([done()])
        .collect()
}

/// A model that follows its instructions.
///
/// Searches first when the mandatory-search directive is present, drafts a
/// date plan when asked for one, then answers.
#[derive(Default)]
pub struct ScriptedProvider {
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn respond(request: &ChatRequest) -> Vec<StreamEvent> {
        let system = request
            .messages
            .first()
            .map(|m| m.content_str())
            .unwrap_or_default();
        let turn_start = request
            .messages
            .iter()
            .rposition(|m| m.role == Role::User)
            .unwrap_or(0);
        let user = request.messages[turn_start].content_str();
        let called: Vec<&str> = request.messages[turn_start..]
            .iter()
            .filter_map(|m| m.tool_calls.as_ref())
            .flatten()
            .map(|c| c.function.name.as_str())
            .collect();

        if system.contains(MANDATORY_SEARCH_DIRECTIVE) && !called.contains(&SEARCH_CAPABILITY) {
            let args = json!({ "query": user }).to_string();
            return vec![
                StreamEvent::ToolCalls(vec![ToolCall::new("call_search", SEARCH_CAPABILITY, args)]),
                done(),
            ];
        }

        if user.contains("随便做个计划") && !called.contains(&"create_date_plan") {
            let args = json!({ "restaurant": {"name": "湖边餐厅"} }).to_string();
            return vec![
                StreamEvent::ToolCalls(vec![ToolCall::new("call_plan", "create_date_plan", args)]),
                done(),
            ];
        }

        if user.contains("约会计划") && !called.contains(&"create_date_plan") {
            let args = json!({
                "title": "七夕约会计划",
                "restaurant": {"name": "湖边餐厅", "time": "19:00"},
                "schedule": "[{\"time\":\"18:00\",\"activity\":\"散步\",\"location\":\"湖边\"}]",
                "gifts": "null",
                "notes": "记得带伞"
            })
            .to_string();
            return vec![
                StreamEvent::ToolCalls(vec![ToolCall::new("call_plan", "create_date_plan", args)]),
                done(),
            ];
        }

        if called.is_empty() {
            tokens(&GREETING_TOKENS)
        } else {
            tokens(&ADVICE_TOKENS)
        }
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream, LLMError> {
        let events = Self::respond(&request);
        self.requests.lock().unwrap().push(request);
        Ok(boxed(events.into_iter().map(Ok).collect()))
    }
}

/// Streams one fragment, then the connection breaks.
pub struct FailingProvider;

#[async_trait]
impl LLMProvider for FailingProvider {
    async fn chat_stream(&self, _request: ChatRequest) -> Result<ChatStream, LLMError> {
        Ok(boxed(vec![
            Ok(StreamEvent::Token("部分".to_string())),
            Err(LLMError::Protocol("connection reset".to_string())),
        ]))
    }
}

/// Streams `count` tokens with `delay` before each.
pub struct SlowProvider {
    pub count: usize,
    pub delay: Duration,
}

impl SlowProvider {
    pub fn full_text(&self) -> String {
        (0..self.count).map(|i| format!("片段{i}")).collect()
    }
}

#[async_trait]
impl LLMProvider for SlowProvider {
    async fn chat_stream(&self, _request: ChatRequest) -> Result<ChatStream, LLMError> {
        let delay = self.delay;
        let chunks = stream::iter(0..self.count).then(move |i| async move {
            tokio::time::sleep(delay).await;
            Ok::<_, LLMError>(StreamEvent::Token(format!("片段{i}")))
        });
        let end = stream::once(async { Ok::<_, LLMError>(done()) });
        Ok(Box::pin(chunks.chain(end)))
    }
}

// ============================================================================
// Capability Doubles
// ============================================================================

/// Offline stand-in for web search.
pub struct StubSearch;

#[async_trait]
impl Capability for StubSearch {
    fn name(&self) -> &str {
        SEARCH_CAPABILITY
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Search
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            SEARCH_CAPABILITY,
            "Search the web",
            json!({"type": "object", "properties": {"query": {"type": "string"}}}),
        )
    }

    async fn invoke(&self, arguments: &Value) -> Result<CapabilityResult, CapabilityError> {
        let query = arguments["query"].as_str().unwrap_or_default();
        Ok(CapabilityResult::text(format!(
            "1. 沟通技巧 - {query}\n   https://example.com/advice"
        )))
    }
}

/// Web search whose backend is not configured.
pub struct UnavailableSearch;

#[async_trait]
impl Capability for UnavailableSearch {
    fn name(&self) -> &str {
        SEARCH_CAPABILITY
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Search
    }

    fn definition(&self) -> ToolDefinition {
        StubSearch.definition()
    }

    async fn invoke(&self, _arguments: &Value) -> Result<CapabilityResult, CapabilityError> {
        Err(CapabilityError::Unavailable("search API key not set".to_string()))
    }
}

// ============================================================================
// App State
// ============================================================================

/// Create a test `AppState` backed by temp directories.
pub async fn test_app_state_with(provider: Arc<dyn LLMProvider>, turn: TurnConfig) -> AppState {
    test_app_state_with_search(provider, turn, Arc::new(StubSearch)).await
}

/// Like [`test_app_state_with`], with a custom search capability.
pub async fn test_app_state_with_search(
    provider: Arc<dyn LLMProvider>,
    turn: TurnConfig,
    search: Arc<dyn Capability>,
) -> AppState {
    use tempfile::TempDir;

    let tmp = TempDir::new().unwrap();
    // Leak the TempDir so it doesn't get cleaned up during the test.
    let tmp = Box::leak(Box::new(tmp));

    let sessions: Arc<dyn SessionStore> =
        Arc::new(FileSessionStore::new(tmp.path().join("sessions")));
    let documents = Arc::new(DocumentGateway::markdown(FileArtifactStore::new(
        tmp.path().join("artifacts"),
    )));

    let capabilities = CapabilityRegistry::new()
        .register(search)
        .register(Arc::new(DatePlanCapability::new(documents.clone())));

    let mut settings = EngineSettings::new("test-model");
    settings.turn = turn;

    let engine = Arc::new(TurnEngine::new(
        sessions.clone(),
        provider,
        capabilities,
        Arc::new(Instructions::new("你是恋爱顾问。", "--- 文档: 单身篇.md ---\n先爱自己")),
        settings,
    ));

    AppState {
        sessions,
        engine,
        documents,
        keep_alive_interval_seconds: 15,
        max_connections: 64,
    }
}

pub async fn test_app_state() -> AppState {
    test_app_state_with(Arc::new(ScriptedProvider::new()), TurnConfig::default()).await
}

/// Create a test app with the scripted provider.
pub async fn test_app() -> Router {
    server::build_app(test_app_state().await, 300)
}

pub fn test_app_from(state: AppState) -> Router {
    server::build_app(state, 300)
}
