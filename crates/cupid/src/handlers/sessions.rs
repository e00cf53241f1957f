//! Session management HTTP handlers.

use axum::Json;
use axum::extract::{Path as PathExtract, Query, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::{error, info};

use crate::api::{CreateSessionRequest, CreateSessionResponse, HistoryResponse};
use crate::handlers::problem_details;
use crate::server::AppState;
use crate::store::is_valid_session_id;

/// Page size when `limit` is omitted.
const DEFAULT_MESSAGES_LIMIT: usize = 100;

#[derive(Deserialize)]
pub struct GetMessagesQuery {
    limit: Option<usize>,
}

/// POST /api/create_session
pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Response {
    match state.sessions.create(&req.user_id, &req.app_name).await {
        Ok(session) => {
            info!(
                session_id = %session.session_id,
                user_id = %session.user_id,
                app_name = %session.app_name,
                "session created"
            );
            Json(CreateSessionResponse {
                session_id: session.session_id,
                user_id: session.user_id,
                app_name: session.app_name,
            })
            .into_response()
        }
        Err(e) => {
            error!(error = %e, "failed to create session");
            problem_details::internal_error("failed to create session").into_response()
        }
    }
}

/// GET /api/sessions/{session_id}/messages
pub async fn get_messages(
    State(state): State<AppState>,
    PathExtract(session_id): PathExtract<String>,
    Query(query): Query<GetMessagesQuery>,
) -> Response {
    if !is_valid_session_id(&session_id) {
        return problem_details::not_found("session not found").into_response();
    }

    let limit = query.limit.unwrap_or(DEFAULT_MESSAGES_LIMIT);
    match state.sessions.history(&session_id, limit).await {
        Ok(messages) => Json(HistoryResponse {
            messages: messages.into_iter().map(Into::into).collect(),
        })
        .into_response(),
        Err(e) if e.is_not_found() => {
            problem_details::not_found("session not found").into_response()
        }
        Err(e) => {
            error!(session_id = %session_id, error = %e, "failed to read history");
            problem_details::internal_error("failed to read history").into_response()
        }
    }
}
