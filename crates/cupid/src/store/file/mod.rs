//! File-based storage implementations.
//!
//! YAML for write-once identity documents, JSONL for append-only logs.

mod session;

pub use session::FileSessionStore;
