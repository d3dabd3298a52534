//! Logical channels over one physical data channel.
pub mod channel_host;
pub mod channel_message;
pub mod multiplexer;
pub mod mux_error;
pub mod mux_sender;
pub mod registry;
mod tests;

pub use channel_host::ChannelHost;
pub use channel_message::ChannelMessage;
pub use multiplexer::{ChannelSignal, Multiplexer};
pub use mux_error::MuxError;
pub use mux_sender::MuxSender;
pub use registry::Unregister;

/// Reserved logical channel that owns unlabelled binary frames.
pub const BULK_CHANNEL: &str = "file-transfer";
