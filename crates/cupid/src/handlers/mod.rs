//! HTTP request handlers.

mod artifacts;
mod chat;
mod health;
pub(crate) mod problem_details;
mod sessions;

pub use artifacts::{download_artifact, list_artifacts};
pub use chat::chat;
pub use health::health;
pub use sessions::{create_session, get_messages};
