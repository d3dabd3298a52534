use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use bytes::Bytes;

use crate::mux::channel_message::ChannelMessage;

pub type MessageHandler = Arc<Mutex<dyn FnMut(&ChannelMessage) + Send>>;
pub type DataHandler = Arc<Mutex<dyn FnMut(Bytes) + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandlerKind {
    Message,
    Data,
    DefaultData,
}

/// Per-channel handler tables. At most one handler per channel and kind;
/// each registration gets a fresh generation so a stale [`Unregister`]
/// cannot remove its replacement.
#[derive(Default)]
pub(crate) struct Registry {
    next_generation: u64,
    message: HashMap<String, (u64, MessageHandler)>,
    data: HashMap<String, (u64, DataHandler)>,
    default_data: Option<(u64, DataHandler)>,
}

impl Registry {
    fn bump(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    pub(crate) fn message_handler(&self, channel: &str) -> Option<MessageHandler> {
        self.message.get(channel).map(|(_, h)| h.clone())
    }

    pub(crate) fn all_message_handlers(&self) -> Vec<(String, MessageHandler)> {
        let mut v: Vec<_> = self
            .message
            .iter()
            .map(|(k, (_, h))| (k.clone(), h.clone()))
            .collect();
        v.sort_by(|a, b| a.0.cmp(&b.0));
        v
    }

    pub(crate) fn data_handler(&self, channel: &str) -> Option<DataHandler> {
        self.data.get(channel).map(|(_, h)| h.clone())
    }

    pub(crate) fn default_data_handler(&self) -> Option<DataHandler> {
        self.default_data.as_ref().map(|(_, h)| h.clone())
    }

    /// The only registered data handler, if exactly one exists.
    pub(crate) fn sole_data_handler(&self) -> Option<(String, DataHandler)> {
        if self.data.len() != 1 {
            return None;
        }
        self.data
            .iter()
            .next()
            .map(|(k, (_, h))| (k.clone(), h.clone()))
    }
}

pub(crate) type SharedRegistry = Arc<Mutex<Registry>>;

pub(crate) fn lock(reg: &SharedRegistry) -> MutexGuard<'_, Registry> {
    reg.lock().unwrap_or_else(|p| p.into_inner())
}

pub(crate) fn insert_message(reg: &SharedRegistry, channel: &str, h: MessageHandler) -> Unregister {
    let mut g = lock(reg);
    let generation = g.bump();
    g.message.insert(channel.to_string(), (generation, h));
    Unregister::new(reg, HandlerKind::Message, channel, generation)
}

pub(crate) fn insert_data(reg: &SharedRegistry, channel: &str, h: DataHandler) -> Unregister {
    let mut g = lock(reg);
    let generation = g.bump();
    g.data.insert(channel.to_string(), (generation, h));
    Unregister::new(reg, HandlerKind::Data, channel, generation)
}

pub(crate) fn insert_default_data(reg: &SharedRegistry, h: DataHandler) -> Unregister {
    let mut g = lock(reg);
    let generation = g.bump();
    g.default_data = Some((generation, h));
    Unregister::new(reg, HandlerKind::DefaultData, "", generation)
}

/// Removes one registration when [`unregister`](Self::unregister) is called.
/// Dropping it without calling leaves the handler in place.
#[must_use = "keep the token to unregister the handler later"]
pub struct Unregister {
    registry: Weak<Mutex<Registry>>,
    kind: HandlerKind,
    channel: String,
    generation: u64,
}

impl Unregister {
    fn new(reg: &SharedRegistry, kind: HandlerKind, channel: &str, generation: u64) -> Self {
        Self {
            registry: Arc::downgrade(reg),
            kind,
            channel: channel.to_string(),
            generation,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Returns false if the handler was already replaced or the multiplexer
    /// is gone.
    pub fn unregister(self) -> bool {
        let Some(reg) = self.registry.upgrade() else {
            return false;
        };
        let mut g = lock(&reg);
        match self.kind {
            HandlerKind::Message => remove_if_current(&mut g.message, &self.channel, self.generation),
            HandlerKind::Data => remove_if_current(&mut g.data, &self.channel, self.generation),
            HandlerKind::DefaultData => {
                if g.default_data.as_ref().map(|(gen_, _)| *gen_) == Some(self.generation) {
                    g.default_data = None;
                    true
                } else {
                    false
                }
            }
        }
    }
}

fn remove_if_current<H>(map: &mut HashMap<String, (u64, H)>, channel: &str, generation: u64) -> bool {
    if map.get(channel).map(|(g, _)| *g) == Some(generation) {
        map.remove(channel);
        true
    } else {
        false
    }
}
