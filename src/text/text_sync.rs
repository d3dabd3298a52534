use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};

use serde::Deserialize;
use serde_json::json;

use crate::log::log_sink::LogSink;
use crate::mux::{ChannelHost, ChannelMessage, MuxError, MuxSender, Unregister};
use crate::{sink_debug, sink_warn};

pub const TEXT_CHANNEL: &str = "text-transfer";
const TEXT_SYNC: &str = "text-sync";
const TEXT_TYPING: &str = "text-typing";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextEvent {
    /// The peer's whole current text.
    TextSynced(String),
    Typing(bool),
}

#[derive(Deserialize)]
struct SyncPayload {
    text: String,
}

#[derive(Deserialize)]
struct TypingPayload {
    typing: bool,
}

/// Mirrors a text buffer to the peer and reports the peer's edits.
pub struct TextSync {
    tx: MuxSender,
    inbox: Receiver<ChannelMessage>,
    handler: Option<Unregister>,
    remote_text: String,
    remote_typing: bool,
    log: Arc<dyn LogSink>,
}

impl TextSync {
    pub fn attach<H: ChannelHost>(host: &H, log: Arc<dyn LogSink>) -> Self {
        let (in_tx, inbox) = mpsc::channel();
        let handler = host.register_handler(TEXT_CHANNEL, move |m: &ChannelMessage| {
            let _ = in_tx.send(m.clone());
        });
        Self {
            tx: host.sender(),
            inbox,
            handler: Some(handler),
            remote_text: String::new(),
            remote_typing: false,
            log,
        }
    }

    /// Last text received from the peer.
    pub fn remote_text(&self) -> &str {
        &self.remote_text
    }

    pub fn remote_typing(&self) -> bool {
        self.remote_typing
    }

    pub fn send_text(&self, text: &str) -> Result<(), MuxError> {
        let msg = ChannelMessage::new(TEXT_SYNC, json!({ "text": text })).on_channel(TEXT_CHANNEL);
        self.tx.try_send(&msg)?;
        sink_debug!(self.log, "synced {} chars of text", text.chars().count());
        Ok(())
    }

    pub fn send_typing(&self, typing: bool) -> Result<(), MuxError> {
        let msg =
            ChannelMessage::new(TEXT_TYPING, json!({ "typing": typing })).on_channel(TEXT_CHANNEL);
        self.tx.try_send(&msg)
    }

    pub fn poll(&mut self) -> Vec<TextEvent> {
        let mut out = Vec::new();
        while let Ok(m) = self.inbox.try_recv() {
            match m.kind.as_str() {
                TEXT_SYNC => match serde_json::from_value::<SyncPayload>(m.payload) {
                    Ok(p) => {
                        self.remote_text.clone_from(&p.text);
                        out.push(TextEvent::TextSynced(p.text));
                    }
                    Err(e) => sink_warn!(self.log, "dropping malformed text-sync: {}", e),
                },
                TEXT_TYPING => match serde_json::from_value::<TypingPayload>(m.payload) {
                    Ok(p) => {
                        self.remote_typing = p.typing;
                        out.push(TextEvent::Typing(p.typing));
                    }
                    Err(e) => sink_warn!(self.log, "dropping malformed text-typing: {}", e),
                },
                other => sink_warn!(self.log, "unknown text message type '{}'", other),
            }
        }
        out
    }

    /// Forgets the peer's state; queued messages are discarded.
    pub fn reset(&mut self) {
        while self.inbox.try_recv().is_ok() {}
        self.remote_text.clear();
        self.remote_typing = false;
    }
}

impl Drop for TextSync {
    fn drop(&mut self) {
        if let Some(h) = self.handler.take() {
            let _ = h.unregister();
        }
    }
}
