use bytes::Bytes;

use crate::mux::{ChannelMessage, Multiplexer, MuxSender, Unregister};

/// Something business layers can hang their channel handlers on: the bare
/// multiplexer, or a session that owns one.
pub trait ChannelHost {
    fn register_handler<F>(&self, channel: &str, handler: F) -> Unregister
    where
        F: FnMut(&ChannelMessage) + Send + 'static;

    fn register_data_handler<F>(&self, channel: &str, handler: F) -> Unregister
    where
        F: FnMut(Bytes) + Send + 'static;

    fn sender(&self) -> MuxSender;
}

impl ChannelHost for Multiplexer {
    fn register_handler<F>(&self, channel: &str, handler: F) -> Unregister
    where
        F: FnMut(&ChannelMessage) + Send + 'static,
    {
        Multiplexer::register_handler(self, channel, handler)
    }

    fn register_data_handler<F>(&self, channel: &str, handler: F) -> Unregister
    where
        F: FnMut(Bytes) + Send + 'static,
    {
        Multiplexer::register_data_handler(self, channel, handler)
    }

    fn sender(&self) -> MuxSender {
        Multiplexer::sender(self)
    }
}
