//! Turn orchestration.
//!
//! A turn runs as a tracked background task:
//! 1. Append the user message
//! 2. Build context (instructions, policy directive, recent history)
//! 3. Stream the model, dispatching capability calls until it answers
//! 4. Append the assistant reply, then emit `TurnComplete`
//!
//! Events reach the caller through a bounded channel. Dropping the returned
//! [`TurnStream`] signals a disconnect; what happens next is governed by
//! [`OnDisconnect`].

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{Instrument, debug, info, info_span, warn};
use ulid::Ulid;

use super::events::{TurnError, TurnEvent};
use super::policy::TurnPolicy;
use crate::background::BackgroundTasks;
use crate::capability::{CapabilityKind, CapabilityRegistry};
use crate::config::{OnDisconnect, TurnConfig};
use crate::knowledge::Instructions;
use crate::llm::{ChatMessage, ChatRequest, LLMProvider, Role, StreamEvent, ToolCall};
use crate::store::{Message, MessageRole, Session, SessionStore};
use crate::sync::KeyedLocks;

pub const TURN_ID_PREFIX: &str = "turn_";

/// Events buffered between the engine and a slow consumer.
const EVENT_BUFFER: usize = 64;

// ============================================================================
// Types
// ============================================================================

/// Model parameters plus turn limits.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub turn: TurnConfig,
}

impl EngineSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: None,
            max_tokens: None,
            turn: TurnConfig::default(),
        }
    }
}

/// The events of one turn.
///
/// Dropping this before the terminal event counts as a client disconnect.
pub struct TurnStream {
    turn_id: String,
    events: ReceiverStream<TurnEvent>,
    _disconnect: DropGuard,
}

impl TurnStream {
    pub fn turn_id(&self) -> &str {
        &self.turn_id
    }
}

impl Stream for TurnStream {
    type Item = TurnEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_next_unpin(cx)
    }
}

struct TurnContext {
    turn_id: String,
    session_id: String,
    message: String,
}

/// Sends events and notices when the consumer has gone.
struct Emitter {
    tx: mpsc::Sender<TurnEvent>,
    cancel: CancellationToken,
    on_disconnect: OnDisconnect,
}

impl Emitter {
    fn should_abort(&self) -> bool {
        self.on_disconnect == OnDisconnect::Abort
            && (self.cancel.is_cancelled() || self.tx.is_closed())
    }

    /// Deliver a non-terminal event. Undeliverable events are dropped unless
    /// the turn aborts on disconnect.
    async fn emit(&self, event: TurnEvent) -> Result<(), TurnError> {
        let delivered = self.tx.send(event).await.is_ok();
        if !delivered {
            debug!("event dropped, consumer gone");
        }
        if self.should_abort() {
            return Err(TurnError::Disconnected);
        }
        Ok(())
    }

    async fn finish(&self, event: TurnEvent) {
        let _ = self.tx.send(event).await;
    }

    /// Next item from `stream`, or `Disconnected` as soon as the consumer
    /// leaves when aborting is configured.
    async fn next<S>(&self, stream: &mut S) -> Result<Option<S::Item>, TurnError>
    where
        S: Stream + Unpin,
    {
        if self.on_disconnect == OnDisconnect::Continue {
            return Ok(stream.next().await);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TurnError::Disconnected),
            item = stream.next() => Ok(item),
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

pub struct TurnEngine {
    sessions: Arc<dyn SessionStore>,
    provider: Arc<dyn LLMProvider>,
    capabilities: CapabilityRegistry,
    policy: TurnPolicy,
    instructions: Arc<Instructions>,
    settings: EngineSettings,
    /// Serializes turns within a session so history pairs never interleave.
    turn_locks: KeyedLocks,
    tasks: BackgroundTasks,
}

impl TurnEngine {
    /// Must be called from within a Tokio runtime.
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        provider: Arc<dyn LLMProvider>,
        capabilities: CapabilityRegistry,
        instructions: Arc<Instructions>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            sessions,
            provider,
            capabilities,
            policy: TurnPolicy::new(),
            instructions,
            settings,
            turn_locks: KeyedLocks::with_cleanup("turn_locks"),
            tasks: BackgroundTasks::new(),
        }
    }

    pub fn policy(&self) -> &TurnPolicy {
        &self.policy
    }

    /// Tasks for turns still running, for shutdown.
    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Start a turn for `message` in an existing session.
    ///
    /// The caller must already have resolved the session; a session that
    /// vanishes mid-flight ends the turn with `TurnFailed`.
    pub fn run_turn(self: &Arc<Self>, session: &Session, message: String) -> TurnStream {
        let turn_id = format!("{TURN_ID_PREFIX}{}", Ulid::new());
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();

        let emitter = Emitter {
            tx,
            cancel: cancel.clone(),
            on_disconnect: self.settings.turn.on_disconnect,
        };
        let turn = TurnContext {
            turn_id: turn_id.clone(),
            session_id: session.session_id.clone(),
            message,
        };

        let span = info_span!("turn", %turn_id, session_id = %session.session_id);
        let engine = Arc::clone(self);
        self.tasks
            .spawn(async move { engine.drive(turn, emitter).await }.instrument(span));

        TurnStream {
            turn_id,
            events: ReceiverStream::new(rx),
            _disconnect: cancel.drop_guard(),
        }
    }

    async fn drive(&self, turn: TurnContext, emitter: Emitter) {
        // One deadline covers queueing behind an earlier turn in the same
        // session as well as reasoning.
        let deadline = Instant::now() + Duration::from_secs(self.settings.turn.timeout_seconds);

        let lock = self.turn_locks.get(&turn.session_id);
        let Ok(_guard) = tokio::time::timeout_at(deadline, lock.lock()).await else {
            warn!("timed out waiting for the previous turn in this session");
            emitter
                .finish(TurnEvent::TurnFailed {
                    reason: TurnError::Timeout.to_string(),
                })
                .await;
            return;
        };

        let required = self.policy.requires_capability(&turn.message);
        debug!(search_required = required, "turn started");

        let outcome = self.execute(&turn, required, deadline, &emitter).await;
        let verdict = self.policy.finish_turn(&turn.turn_id, required);

        let terminal = match outcome {
            Ok(()) => {
                info!(
                    search_required = verdict.search_required,
                    search_invoked = verdict.search_invoked,
                    "turn completed"
                );
                TurnEvent::TurnComplete
            }
            Err(TurnError::Disconnected) => {
                info!("client disconnected, turn abandoned");
                return;
            }
            Err(e) => {
                warn!(error = %e, "turn failed");
                TurnEvent::TurnFailed {
                    reason: e.to_string(),
                }
            }
        };
        emitter.finish(terminal).await;
    }

    async fn execute(
        &self,
        turn: &TurnContext,
        required: bool,
        deadline: Instant,
        emitter: &Emitter,
    ) -> Result<(), TurnError> {
        self.sessions
            .append(&turn.session_id, &Message::user(turn.message.as_str()))
            .await?;

        // Commit happens outside the timeout so a late timer never races a
        // half-finished append.
        let reply = tokio::time::timeout_at(deadline, self.reason(turn, required, emitter))
            .await
            .map_err(|_| TurnError::Timeout)??;

        if emitter.should_abort() {
            return Err(TurnError::Disconnected);
        }

        self.sessions
            .append(&turn.session_id, &Message::assistant(reply))
            .await?;
        Ok(())
    }

    /// Run the reasoning loop and return the full reply text.
    async fn reason(
        &self,
        turn: &TurnContext,
        required: bool,
        emitter: &Emitter,
    ) -> Result<String, TurnError> {
        let mut messages = self.build_context(turn, required).await?;
        let tools = self.capabilities.definitions();
        let max_rounds = self.settings.turn.max_capability_rounds.max(1);
        let mut reply = String::new();

        for round in 1..=max_rounds {
            debug!(round, messages = messages.len(), "reasoning round");

            let request = ChatRequest {
                model: self.settings.model.clone(),
                messages: messages.clone(),
                temperature: self.settings.temperature,
                max_tokens: self.settings.max_tokens,
                tools: tools.clone(),
            };
            let mut stream = self.provider.chat_stream(request).await?;

            let mut round_text = String::new();
            let mut tool_calls: Vec<ToolCall> = Vec::new();
            let mut finished = false;

            while let Some(event) = emitter.next(&mut stream).await? {
                match event? {
                    StreamEvent::Token(text) => {
                        round_text.push_str(&text);
                        reply.push_str(&text);
                        emitter.emit(TurnEvent::TextChunk { text }).await?;
                    }
                    StreamEvent::ToolCalls(calls) => tool_calls.extend(calls),
                    StreamEvent::Done { usage } => {
                        if let Some(usage) = usage {
                            debug!(
                                prompt_tokens = usage.prompt_tokens,
                                completion_tokens = usage.completion_tokens,
                                "round usage"
                            );
                        }
                        finished = true;
                        break;
                    }
                }
            }

            if !finished {
                return Err(TurnError::ReasoningFailure(
                    "model stream ended before completion".to_string(),
                ));
            }

            if tool_calls.is_empty() {
                return Ok(reply);
            }

            let content = (!round_text.is_empty()).then_some(round_text);
            messages.push(ChatMessage::assistant_tool_calls(content, tool_calls.clone()));

            for call in &tool_calls {
                let invocation = self.capabilities.dispatch(call).await;
                messages.push(ChatMessage::tool_result(
                    &invocation.call_id,
                    invocation.tool_result_text(),
                ));

                let is_search = invocation.kind == Some(CapabilityKind::Search);
                let name = invocation.name;
                emitter
                    .emit(TurnEvent::CapabilityInvoked {
                        name: name.clone(),
                        arguments: invocation.arguments,
                    })
                    .await?;
                if is_search {
                    self.policy.record_invocation(&turn.turn_id, &name);
                }
            }
        }

        Err(TurnError::ReasoningFailure(format!(
            "no answer after {max_rounds} reasoning rounds"
        )))
    }

    async fn build_context(
        &self,
        turn: &TurnContext,
        required: bool,
    ) -> Result<Vec<ChatMessage>, TurnError> {
        let history = self
            .sessions
            .history(&turn.session_id, self.settings.turn.history_limit)
            .await?;

        let system = format!(
            "{}\n\n{}",
            self.instructions.base_prompt(),
            self.policy.directive(required)
        );

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::text(Role::System, system));
        messages.extend(history.into_iter().filter_map(|m| {
            let role = match m.role {
                MessageRole::User => Role::User,
                MessageRole::Assistant => Role::Assistant,
                MessageRole::Tool => return None,
            };
            Some(ChatMessage::text(role, m.content))
        }));
        Ok(messages)
    }
}
