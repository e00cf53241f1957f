//! Conversational relationship assistant.
//!
//! A turn takes one user message through the [`turn::TurnEngine`], which
//! consults the [`turn::TurnPolicy`], calls the model and its capabilities,
//! and commits the exchange to the [`store::SessionStore`]. The HTTP layer in
//! [`handlers`] delivers the resulting events as SSE frames or one reply.

pub mod api;
pub mod background;
pub mod capability;
pub mod config;
pub mod document;
pub mod handlers;
pub mod knowledge;
pub mod llm;
pub mod server;
pub mod sse_parser;
pub mod store;
pub mod sync;
pub mod turn;
