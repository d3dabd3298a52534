//! The embedder-facing endpoint: one session and its business layers,
//! driven by a single poll loop.
pub mod engine;
pub mod events;

pub use engine::{Engine, split_events};
pub use events::EngineEvent;
