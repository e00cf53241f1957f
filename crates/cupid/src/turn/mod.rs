//! Turn execution: policy, orchestration and delivery.

mod delivery;
mod engine;
mod events;
pub mod policy;

pub use delivery::{collect_reply, frames};
pub use engine::{EngineSettings, TURN_ID_PREFIX, TurnEngine, TurnStream};
pub use events::{TurnError, TurnEvent};
pub use policy::{MANDATORY_SEARCH_DIRECTIVE, PolicyVerdict, TurnPolicy};
