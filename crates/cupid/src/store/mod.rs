//! Durable session storage.
//!
//! The [`SessionStore`] trait is the only place conversation history lives.
//! The file backend keeps one directory per session with an append-only
//! message log.

mod error;
pub mod file;
mod session;

pub use error::{StorageError, StorageResult};
pub use file::FileSessionStore;
pub use session::{Message, MessageRole, Session, SessionStore, is_valid_session_id};
