//! Listing and download of generated documents.

use std::fmt::Write;

use axum::Json;
use axum::extract::{Path as PathExtract, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::api::{ArtifactListResponse, ArtifactSummary};
use crate::capability::ARTIFACT_ROUTE_PREFIX;
use crate::handlers::problem_details;
use crate::server::AppState;

/// GET /api/artifacts
pub async fn list_artifacts(State(state): State<AppState>) -> Response {
    match state.documents.artifacts().list().await {
        Ok(entries) => {
            let artifacts = entries
                .into_iter()
                .map(|entry| ArtifactSummary {
                    download_url: format!("{ARTIFACT_ROUTE_PREFIX}{}", entry.name),
                    name: entry.name,
                    size: entry.size,
                    created_at: entry.created_at.to_rfc3339(),
                })
                .collect();
            Json(ArtifactListResponse { artifacts }).into_response()
        }
        Err(e) => {
            error!(error = %e, "failed to list artifacts");
            problem_details::internal_error("failed to list artifacts").into_response()
        }
    }
}

/// GET /api/artifacts/{name}
pub async fn download_artifact(
    State(state): State<AppState>,
    PathExtract(name): PathExtract<String>,
) -> Response {
    match state.documents.artifacts().read(&name).await {
        Ok(Some(bytes)) => (
            [
                (header::CONTENT_TYPE, state.documents.content_type().to_string()),
                (header::CONTENT_DISPOSITION, content_disposition(&name)),
            ],
            bytes,
        )
            .into_response(),
        Ok(None) => problem_details::not_found("artifact not found").into_response(),
        Err(e) => {
            error!(artifact_id = %name, error = %e, "failed to read artifact");
            problem_details::internal_error("failed to read artifact").into_response()
        }
    }
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 UTF-8 name.
fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| if c.is_ascii_graphic() && c != '"' && c != '\\' { c } else { '_' })
        .collect();

    let mut encoded = String::with_capacity(name.len() * 3);
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || b"-._~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            let _ = write!(encoded, "%{byte:02X}");
        }
    }

    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_is_ascii_with_utf8_name() {
        let value = content_disposition("七夕_20250101_120000.md");
        assert!(value.is_ascii());
        assert!(value.starts_with("attachment; filename=\"__"));
        assert!(value.contains("filename*=UTF-8''%E4%B8%83%E5%A4%95_20250101_120000.md"));
    }
}
