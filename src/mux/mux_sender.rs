use std::sync::{Arc, Mutex};

use bytes::Bytes;
use serde_json::Value;

use crate::log::log_sink::LogSink;
use crate::mux::{channel_message::ChannelMessage, mux_error::MuxError};
use crate::peer::data_channel::{ChannelState, DataChannel, Frame};
use crate::{sink_debug, sink_warn};

pub(crate) type ChannelSlot = Arc<Mutex<Option<Arc<dyn DataChannel>>>>;

/// Cloneable send-side handle on the multiplexed channel.
///
/// Every send reports failure as `false` instead of an error: callers retry
/// or surface it, they never assume delivery.
#[derive(Clone)]
pub struct MuxSender {
    slot: ChannelSlot,
    log: Arc<dyn LogSink>,
}

impl MuxSender {
    pub(crate) fn new(slot: ChannelSlot, log: Arc<dyn LogSink>) -> Self {
        Self { slot, log }
    }

    fn channel(&self) -> Option<Arc<dyn DataChannel>> {
        self.slot
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn open_channel(&self) -> Option<Arc<dyn DataChannel>> {
        self.channel()
            .filter(|ch| ch.ready_state() == ChannelState::Open)
    }

    pub fn is_ready(&self) -> bool {
        self.open_channel().is_some()
    }

    /// Bytes queued on the physical channel, zero when none is attached.
    pub fn buffered_amount(&self) -> usize {
        self.channel().map_or(0, |ch| ch.buffered_amount())
    }

    pub fn send_message(&self, kind: &str, payload: Value, channel: Option<&str>) -> bool {
        let mut msg = ChannelMessage::new(kind, payload);
        msg.channel = channel.map(str::to_string);
        self.send(&msg)
    }

    /// `try_send` for callers that only need to know whether it went out.
    pub fn send(&self, msg: &ChannelMessage) -> bool {
        match self.try_send(msg) {
            Ok(()) => true,
            Err(MuxError::NotOpen) => {
                sink_debug!(self.log, "dropping '{}' message: channel not open", msg.kind);
                false
            }
            Err(e) => {
                sink_warn!(self.log, "sending '{}' failed: {}", msg.kind, e);
                false
            }
        }
    }

    pub fn try_send(&self, msg: &ChannelMessage) -> Result<(), MuxError> {
        let ch = self.open_channel().ok_or(MuxError::NotOpen)?;
        let text = msg.encode().map_err(|e| MuxError::Encode(e.to_string()))?;
        ch.send(Frame::Text(text))?;
        Ok(())
    }

    /// Sends one binary frame. The receiver can only attribute it if a
    /// control message describing it was sent immediately before.
    pub fn send_data(&self, data: Bytes) -> bool {
        let len = data.len();
        match self.try_send_data(data) {
            Ok(()) => true,
            Err(MuxError::NotOpen) => {
                sink_debug!(self.log, "dropping {} byte frame: channel not open", len);
                false
            }
            Err(e) => {
                sink_warn!(self.log, "binary send failed: {}", e);
                false
            }
        }
    }

    pub fn try_send_data(&self, data: Bytes) -> Result<(), MuxError> {
        let ch = self.open_channel().ok_or(MuxError::NotOpen)?;
        ch.send(Frame::Binary(data))?;
        Ok(())
    }
}
