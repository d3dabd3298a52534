use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::log::log_sink::LogSink;
use crate::mux::{
    BULK_CHANNEL,
    channel_message::ChannelMessage,
    mux_sender::{ChannelSlot, MuxSender},
    registry::{self, DataHandler, MessageHandler, SharedRegistry, Unregister},
};
use crate::peer::data_channel::{ChannelEvent, DataChannel, Frame};
use crate::{sink_debug, sink_trace, sink_warn};

/// Lifecycle changes of the attached physical channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSignal {
    Opened,
    Closed,
    Error(String),
}

/// Shares one ordered data channel between several logical channels.
///
/// Text frames are [`ChannelMessage`]s routed by their `channel` field.
/// Binary frames go to the data handler of [`BULK_CHANNEL`]; without one,
/// to the explicit default data handler; without that, to the only data
/// handler if exactly one is registered. Anything else is dropped.
pub struct Multiplexer {
    registry: SharedRegistry,
    slot: ChannelSlot,
    log: Arc<dyn LogSink>,
}

impl Multiplexer {
    pub fn new(log: Arc<dyn LogSink>) -> Self {
        Self {
            registry: SharedRegistry::default(),
            slot: Arc::new(Mutex::new(None)),
            log,
        }
    }

    /// Replaces any handler registered for `channel`.
    pub fn register_handler<F>(&self, channel: &str, handler: F) -> Unregister
    where
        F: FnMut(&ChannelMessage) + Send + 'static,
    {
        let h: MessageHandler = Arc::new(Mutex::new(handler));
        registry::insert_message(&self.registry, channel, h)
    }

    /// Replaces any data handler registered for `channel`.
    pub fn register_data_handler<F>(&self, channel: &str, handler: F) -> Unregister
    where
        F: FnMut(Bytes) + Send + 'static,
    {
        let h: DataHandler = Arc::new(Mutex::new(handler));
        registry::insert_data(&self.registry, channel, h)
    }

    /// Receives binary frames when no bulk-channel handler is registered.
    pub fn set_default_data_handler<F>(&self, handler: F) -> Unregister
    where
        F: FnMut(Bytes) + Send + 'static,
    {
        let h: DataHandler = Arc::new(Mutex::new(handler));
        registry::insert_default_data(&self.registry, h)
    }

    pub fn sender(&self) -> MuxSender {
        MuxSender::new(self.slot.clone(), self.log.clone())
    }

    /// Starts multiplexing over `channel`, closing whatever was attached.
    pub fn attach(&self, channel: Arc<dyn DataChannel>) {
        sink_debug!(self.log, "attaching data channel '{}'", channel.label());
        let old = self
            .slot
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .replace(channel);
        if let Some(old) = old {
            old.close();
        }
    }

    /// Closes and forgets the attached channel. Registered handlers stay.
    pub fn detach(&self) {
        let old = self.slot.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(ch) = old {
            ch.close();
        }
    }

    pub fn is_attached(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    /// Drains the attached channel: dispatches every frame to handlers and
    /// returns lifecycle signals in arrival order.
    pub fn pump(&self) -> Vec<ChannelSignal> {
        let Some(ch) = self.slot.lock().unwrap_or_else(|p| p.into_inner()).clone() else {
            return Vec::new();
        };
        let mut signals = Vec::new();
        while let Some(ev) = ch.poll_event() {
            match ev {
                ChannelEvent::Open => signals.push(ChannelSignal::Opened),
                ChannelEvent::Message(Frame::Text(text)) => self.dispatch_text(&text),
                ChannelEvent::Message(Frame::Binary(data)) => self.dispatch_binary(data),
                ChannelEvent::Closed => signals.push(ChannelSignal::Closed),
                ChannelEvent::Error(e) => signals.push(ChannelSignal::Error(e)),
            }
        }
        signals
    }

    pub fn dispatch_text(&self, text: &str) {
        let msg = match ChannelMessage::decode(text) {
            Ok(m) => m,
            Err(e) => {
                sink_warn!(self.log, "dropping undecodable control message: {}", e);
                return;
            }
        };

        match msg.channel.as_deref() {
            Some(channel) => {
                let handler = registry::lock(&self.registry).message_handler(channel);
                match handler {
                    Some(h) => call_message(&h, &msg),
                    None => sink_warn!(
                        self.log,
                        "no handler for channel '{}', dropping '{}'",
                        channel,
                        msg.kind
                    ),
                }
            }
            None => {
                let handlers = registry::lock(&self.registry).all_message_handlers();
                sink_trace!(
                    self.log,
                    "broadcasting untagged '{}' to {} handlers",
                    msg.kind,
                    handlers.len()
                );
                for (_, h) in handlers {
                    call_message(&h, &msg);
                }
            }
        }
    }

    pub fn dispatch_binary(&self, data: Bytes) {
        let (bulk, default, sole) = {
            let reg = registry::lock(&self.registry);
            (
                reg.data_handler(BULK_CHANNEL),
                reg.default_data_handler(),
                reg.sole_data_handler(),
            )
        };
        if let Some(h) = bulk.or(default) {
            call_data(&h, data);
        } else if let Some((channel, h)) = sole {
            sink_debug!(self.log, "routing binary frame to sole data handler '{}'", channel);
            call_data(&h, data);
        } else {
            sink_warn!(
                self.log,
                "dropping {} byte binary frame: no data handler to route it to",
                data.len()
            );
        }
    }
}

fn call_message(h: &MessageHandler, msg: &ChannelMessage) {
    let mut f = h.lock().unwrap_or_else(|p| p.into_inner());
    (*f)(msg);
}

fn call_data(h: &DataHandler, data: Bytes) {
    let mut f = h.lock().unwrap_or_else(|p| p.into_inner());
    (*f)(data);
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        self.detach();
    }
}
