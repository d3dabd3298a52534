//! Live text sharing and typing indicator on the `text-transfer` channel.
pub mod text_sync;

pub use text_sync::{TEXT_CHANNEL, TextEvent, TextSync};
