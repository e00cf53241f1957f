//! Document Capability Gateway.
//!
//! Validates structured date-plan requests, renders them and stores the
//! result under a fresh name. Callers only ever see an [`DocumentArtifact`]
//! descriptor, never the bytes.

mod render;
mod request;
mod store;

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::store::StorageError;

pub use render::{DocumentRenderer, MarkdownRenderer};
pub use request::{DatePlanRequest, GiftEntry, Restaurant, ScheduleEntry};
pub use store::{ArtifactEntry, FileArtifactStore};

/// Longest title fragment kept in an artifact name, in characters.
const MAX_TITLE_CHARS: usize = 60;

#[derive(Debug, Error)]
pub enum GenerationError {
    /// Structurally unusable request (only a missing title qualifies).
    #[error("invalid document request: {0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Descriptor of a stored document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentArtifact {
    /// Storage key, also the download name.
    pub artifact_id: String,
    /// Title as requested.
    pub display_name: String,
    pub byte_size: u64,
    pub created_at: DateTime<Utc>,
}

pub struct DocumentGateway {
    store: FileArtifactStore,
    renderer: Arc<dyn DocumentRenderer>,
}

impl DocumentGateway {
    pub fn new(store: FileArtifactStore, renderer: Arc<dyn DocumentRenderer>) -> Self {
        Self { store, renderer }
    }

    /// Markdown gateway over `store`.
    pub fn markdown(store: FileArtifactStore) -> Self {
        Self::new(store, Arc::new(MarkdownRenderer))
    }

    pub fn artifacts(&self) -> &FileArtifactStore {
        &self.store
    }

    pub fn content_type(&self) -> &'static str {
        self.renderer.content_type()
    }

    /// Render and store a plan.
    ///
    /// The artifact name is `{title}_{YYYYmmdd_HHMMSS}.{ext}`, with a numeric
    /// suffix when that name is already taken.
    pub async fn generate(
        &self,
        request: &DatePlanRequest,
    ) -> Result<DocumentArtifact, GenerationError> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(GenerationError::Validation("title is required".to_string()));
        }

        let now = Local::now();
        let bytes = self.renderer.render(request, now);
        let stem = format!("{}_{}", sanitize_title(title), now.format("%Y%m%d_%H%M%S"));
        let name = self
            .store
            .create_unique(&stem, self.renderer.extension(), &bytes)
            .await?;

        info!(artifact_id = %name, bytes = bytes.len(), "document generated");

        Ok(DocumentArtifact {
            artifact_id: name,
            display_name: title.to_string(),
            byte_size: bytes.len() as u64,
            created_at: now.with_timezone(&Utc),
        })
    }
}

/// Make a title safe as a file name fragment.
fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() || c.is_whitespace() => '_',
            c => c,
        })
        .take(MAX_TITLE_CHARS)
        .collect();

    let trimmed = cleaned.trim_matches(|c| c == '_' || c == '.');
    if trimmed.is_empty() {
        "document".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn gateway() -> (TempDir, DocumentGateway) {
        let tmp = TempDir::new().unwrap();
        let gateway = DocumentGateway::markdown(FileArtifactStore::new(tmp.path()));
        (tmp, gateway)
    }

    fn plan(title: &str) -> DatePlanRequest {
        DatePlanRequest {
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn empty_schedule_still_succeeds() {
        let (_tmp, gateway) = gateway();

        let artifact = gateway.generate(&plan("七夕约会计划")).await.unwrap();

        assert!(artifact.artifact_id.starts_with("七夕约会计划_"));
        assert!(artifact.artifact_id.ends_with(".md"));
        // Title, underscore, 8-digit date, underscore, 6-digit time.
        let stamp = artifact
            .artifact_id
            .trim_start_matches("七夕约会计划_")
            .trim_end_matches(".md");
        assert_eq!(stamp.len(), 15);
        assert!(artifact.byte_size > 0);
        assert_eq!(artifact.display_name, "七夕约会计划");
    }

    #[tokio::test]
    async fn identical_titles_never_collide() {
        let (_tmp, gateway) = gateway();

        let mut names = std::collections::HashSet::new();
        for _ in 0..5 {
            let artifact = gateway.generate(&plan("约会")).await.unwrap();
            assert!(names.insert(artifact.artifact_id));
        }
        assert_eq!(gateway.artifacts().list().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn concurrent_identical_titles_never_collide() {
        let (_tmp, gateway) = gateway();
        let gateway = Arc::new(gateway);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gateway = gateway.clone();
                tokio::spawn(async move { gateway.generate(&plan("同名")).await.unwrap() })
            })
            .collect();

        let mut names = std::collections::HashSet::new();
        for handle in handles {
            assert!(names.insert(handle.await.unwrap().artifact_id));
        }
    }

    #[tokio::test]
    async fn blank_title_is_rejected() {
        let (_tmp, gateway) = gateway();
        let err = gateway.generate(&plan("  ")).await.unwrap_err();
        assert!(matches!(err, GenerationError::Validation(_)));
    }

    #[test]
    fn sanitizes_path_characters() {
        assert_eq!(sanitize_title("../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_title("周末 约会"), "周末_约会");
        assert_eq!(sanitize_title("///"), "document");
    }
}
