//! Append-only artifact storage on the local filesystem.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::store::{StorageError, StorageResult};

/// Gives up disambiguating after this many same-second collisions.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Stored artifact as seen by listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactEntry {
    pub name: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// Directory of rendered documents, keyed by file name.
///
/// Files are only ever created with create-new semantics, so an existing
/// artifact is never overwritten.
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    dir: PathBuf,
}

impl FileArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    /// Write `bytes` under `{stem}.{ext}`, or `{stem}_{n}.{ext}` if taken.
    ///
    /// Returns the chosen name.
    pub async fn create_unique(&self, stem: &str, ext: &str, bytes: &[u8]) -> StorageResult<String> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StorageError::file_io(&self.dir, e))?;

        for attempt in 1..=MAX_NAME_ATTEMPTS {
            let name = if attempt == 1 {
                format!("{stem}.{ext}")
            } else {
                format!("{stem}_{attempt}.{ext}")
            };
            let path = self.dir.join(&name);

            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(StorageError::file_io(&path, e)),
            };

            file.write_all(bytes)
                .await
                .map_err(|e| StorageError::file_io(&path, e))?;
            file.sync_all()
                .await
                .map_err(|e| StorageError::file_io(&path, e))?;
            return Ok(name);
        }

        Err(StorageError::file_io(
            self.dir.join(stem),
            std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "no free artifact name left for this stem",
            ),
        ))
    }

    /// All artifacts, newest first.
    pub async fn list(&self) -> StorageResult<Vec<ArtifactEntry>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::file_io(&self.dir, e)),
        };

        let mut artifacts = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::file_io(&self.dir, e))?
        {
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            if !metadata.is_file() || !is_valid_artifact_name(&name) {
                continue;
            }

            let created = metadata.created().or_else(|_| metadata.modified());
            artifacts.push(ArtifactEntry {
                name,
                size: metadata.len(),
                created_at: created.map(DateTime::<Utc>::from).unwrap_or_default(),
            });
        }

        artifacts.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.name.cmp(&a.name))
        });
        Ok(artifacts)
    }

    /// Read an artifact by name. `Ok(None)` if absent or the name is not a plain file name.
    pub async fn read(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        if !is_valid_artifact_name(name) {
            return Ok(None);
        }

        let path = self.dir.join(name);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::file_io(&path, e)),
        }
    }
}

/// A single visible path segment, nothing that could escape the directory.
fn is_valid_artifact_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
        && !name.ends_with(".tmp")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn create_unique_never_overwrites() {
        let tmp = TempDir::new().unwrap();
        let store = FileArtifactStore::new(tmp.path());

        let first = store.create_unique("plan_20250101_120000", "md", b"one").await.unwrap();
        let second = store.create_unique("plan_20250101_120000", "md", b"two").await.unwrap();
        let third = store.create_unique("plan_20250101_120000", "md", b"three").await.unwrap();

        assert_eq!(first, "plan_20250101_120000.md");
        assert_eq!(second, "plan_20250101_120000_2.md");
        assert_eq!(third, "plan_20250101_120000_3.md");
        assert_eq!(store.read(&first).await.unwrap().unwrap(), b"one");
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let tmp = TempDir::new().unwrap();
        let store = FileArtifactStore::new(tmp.path());

        store.create_unique("a", "md", b"1").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        store.create_unique("b", "md", b"22").await.unwrap();

        let listed = store.list().await.unwrap();
        let names: Vec<_> = listed.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["b.md", "a.md"]);
        assert_eq!(listed[0].size, 2);
    }

    #[tokio::test]
    async fn list_of_missing_dir_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = FileArtifactStore::new(tmp.path().join("nope"));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_rejects_traversal() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("secret.txt"), "x").unwrap();
        let store = FileArtifactStore::new(tmp.path().join("artifacts"));

        assert!(store.read("../secret.txt").await.unwrap().is_none());
        assert!(store.read(".hidden").await.unwrap().is_none());
        assert!(store.read("missing.md").await.unwrap().is_none());
    }
}
