//! Turn submission over HTTP.

use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use tracing::{debug, error};

use crate::api::TurnRequest;
use crate::handlers::problem_details;
use crate::server::AppState;
use crate::store::Session;
use crate::turn::{self, TurnStream};

/// POST /api/chat
///
/// With `stream: true` (the default) the reply is SSE with data-only frames:
/// - `{"type":"session_id","session_id":"..."}` first
/// - `{"type":"message","content":"..."}` per text chunk
/// - `{"type":"error","error":"..."}` if the turn fails
/// - `{"type":"done"}` last, always
///
/// Otherwise the whole reply is returned as one JSON object. An unknown or
/// foreign `session_id` is a 404 before any frame is written.
pub async fn chat(State(state): State<AppState>, Json(req): Json<TurnRequest>) -> Response {
    if req.message.trim().is_empty() {
        return problem_details::bad_request("message must not be empty").into_response();
    }

    let session = match state
        .sessions
        .resolve_or_create(&req.user_id, &req.app_name, req.session_id.as_deref())
        .await
    {
        Ok(session) => session,
        Err(e) if e.is_not_found() => {
            return problem_details::not_found("session not found").into_response();
        }
        Err(e) => {
            error!(error = %e, "failed to resolve session");
            return problem_details::internal_error("failed to resolve session").into_response();
        }
    };

    let events = state.engine.run_turn(&session, req.message);
    debug!(
        session_id = %session.session_id,
        turn_id = %events.turn_id(),
        stream = req.stream,
        "turn submitted"
    );

    if req.stream {
        stream_reply(&state, session, events)
    } else {
        buffered_reply(session, events).await
    }
}

fn stream_reply(state: &AppState, session: Session, events: TurnStream) -> Response {
    let frames =
        turn::frames(session.session_id, events).map(|frame| Event::default().json_data(&frame));

    let keep_alive = KeepAlive::new()
        .interval(Duration::from_secs(state.keep_alive_interval_seconds))
        .text("keep-alive");

    Sse::new(frames).keep_alive(keep_alive).into_response()
}

async fn buffered_reply(session: Session, events: TurnStream) -> Response {
    match turn::collect_reply(&session, events).await {
        Ok(reply) => Json(reply).into_response(),
        Err(e) => {
            error!(session_id = %session.session_id, error = %e, "buffered turn failed");
            problem_details::internal_error(e.to_string()).into_response()
        }
    }
}
