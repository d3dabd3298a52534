use bytes::Bytes;

use crate::peer::peer_error::ChannelError;

/// One message on an ordered, message-based channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

impl Frame {
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(t) => t.len(),
            Frame::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Open,
    Message(Frame),
    Closed,
    Error(String),
}

/// Bidirectional ordered message channel opened through a peer connection.
///
/// Frames are delivered whole and in send order. `buffered_amount` is the
/// number of bytes accepted by `send` but not yet handed to the network.
pub trait DataChannel: Send + Sync {
    fn label(&self) -> &str;
    fn ready_state(&self) -> ChannelState;
    fn send(&self, frame: Frame) -> Result<(), ChannelError>;
    fn buffered_amount(&self) -> usize;
    /// Next event that arrived on this channel, if any.
    fn poll_event(&self) -> Option<ChannelEvent>;
    fn close(&self);
}
