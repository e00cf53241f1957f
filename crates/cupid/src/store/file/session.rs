//! File-based session storage.
//!
//! Directory structure:
//! ```text
//! {sessions_dir}/
//!   {session_id}/
//!     session.yaml       # Identity, written once (temp file + rename)
//!     messages.jsonl     # Append-only history, fsynced per append
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::api::SESSION_ID_PREFIX;
use crate::store::error::{StorageError, StorageResult};
use crate::store::session::{Message, Session, SessionStore, is_valid_session_id};
use crate::sync::KeyedLocks;

const SESSION_FILE: &str = "session.yaml";
const MESSAGES_FILE: &str = "messages.jsonl";

/// File-based implementation of [`SessionStore`].
///
/// Appends to one session are serialized through a per-session lock so the
/// log order always matches commit order. Different sessions never contend.
#[derive(Clone)]
pub struct FileSessionStore {
    sessions_dir: PathBuf,
    locks: KeyedLocks,
}

impl FileSessionStore {
    /// Create a new file session store.
    ///
    /// The sessions directory is created lazily on first write.
    pub fn new(sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
            locks: KeyedLocks::new(),
        }
    }

    /// Same as [`FileSessionStore::new`] but periodically drops idle session locks.
    pub fn with_lock_cleanup(sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
            locks: KeyedLocks::with_cleanup("session_appends"),
        }
    }

    fn session_dir(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(session_id)
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join(SESSION_FILE)
    }

    fn messages_path(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join(MESSAGES_FILE)
    }

    async fn exists(&self, session_id: &str) -> bool {
        is_valid_session_id(session_id)
            && fs::try_exists(self.session_path(session_id))
                .await
                .unwrap_or(false)
    }

    async fn read_messages(&self, session_id: &str) -> StorageResult<Vec<Message>> {
        let path = self.messages_path(session_id);

        let file = match File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::file_io(&path, e)),
        };

        let mut lines = BufReader::new(file).lines();
        let mut messages = Vec::new();

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| StorageError::file_io(&path, e))?
        {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            // A torn final line after a crash is skipped, never fatal.
            match serde_json::from_str::<Message>(trimmed) {
                Ok(message) => messages.push(message),
                Err(e) => {
                    warn!(session_id, error = %e, "skipping malformed history line");
                }
            }
        }

        Ok(messages)
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn create(&self, user_id: &str, app_name: &str) -> StorageResult<Session> {
        let session = Session {
            session_id: format!("{}{}", SESSION_ID_PREFIX, Ulid::new()),
            user_id: user_id.to_string(),
            app_name: app_name.to_string(),
            created_at: Utc::now(),
        };

        let dir = self.session_dir(&session.session_id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::file_io(&dir, e))?;

        let yaml = serde_saphyr::to_string(&session)
            .map_err(|e| StorageError::serialization(e.to_string()))?;

        let final_path = self.session_path(&session.session_id);
        let temp_path = dir.join(format!("{SESSION_FILE}.tmp"));

        fs::write(&temp_path, yaml.as_bytes())
            .await
            .map_err(|e| StorageError::file_io(&temp_path, e))?;
        fs::rename(&temp_path, &final_path)
            .await
            .map_err(|e| StorageError::file_io(&final_path, e))?;

        // The log exists from the start so no append ever creates a directory entry.
        let messages_path = self.messages_path(&session.session_id);
        let log = File::create(&messages_path)
            .await
            .map_err(|e| StorageError::file_io(&messages_path, e))?;
        log.sync_all()
            .await
            .map_err(|e| StorageError::file_io(&messages_path, e))?;

        sync_dir(&dir).await?;
        sync_dir(&self.sessions_dir).await?;

        debug!(session_id = %session.session_id, user_id, app_name, "session created");
        Ok(session)
    }

    async fn load(&self, session_id: &str) -> StorageResult<Option<Session>> {
        if !is_valid_session_id(session_id) {
            return Ok(None);
        }

        let path = self.session_path(session_id);
        let contents = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::file_io(&path, e)),
        };

        let session: Session = serde_saphyr::from_str(&contents)
            .map_err(|e| StorageError::file_deserialization(&path, e.to_string()))?;
        Ok(Some(session))
    }

    async fn append(&self, session_id: &str, message: &Message) -> StorageResult<()> {
        let lock = self.locks.get(session_id);
        let _guard = lock.lock().await;

        if !self.exists(session_id).await {
            return Err(StorageError::session_not_found(session_id));
        }

        let path = self.messages_path(session_id);
        let mut line =
            serde_json::to_string(message).map_err(|e| StorageError::serialization(e.to_string()))?;
        line.push('\n');

        let is_new = !fs::try_exists(&path).await.unwrap_or(false);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StorageError::file_io(&path, e))?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StorageError::file_io(&path, e))?;

        // Committed only once the data is on disk.
        file.sync_all()
            .await
            .map_err(|e| StorageError::file_io(&path, e))?;
        if is_new {
            sync_dir(&self.session_dir(session_id)).await?;
        }

        Ok(())
    }

    async fn history(&self, session_id: &str, limit: usize) -> StorageResult<Vec<Message>> {
        if !self.exists(session_id).await {
            return Err(StorageError::session_not_found(session_id));
        }

        let mut messages = self.read_messages(session_id).await?;
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.split_off(skip))
    }
}

/// Flush directory entries (new or renamed files) to disk.
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> StorageResult<()> {
    let handle = File::open(dir)
        .await
        .map_err(|e| StorageError::file_io(dir, e))?;
    handle
        .sync_all()
        .await
        .map_err(|e| StorageError::file_io(dir, e))
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> StorageResult<()> {
    Ok(())
}
