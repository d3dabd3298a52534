use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerError {
    /// The operation is not allowed in the current negotiation state.
    InvalidState(&'static str),
    /// The capability rejected a description or candidate.
    Rejected(String),
    Closed,
}

impl fmt::Display for PeerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerError::InvalidState(op) => write!(f, "{op} not allowed in current state"),
            PeerError::Rejected(e) => write!(f, "rejected by peer connection: {e}"),
            PeerError::Closed => write!(f, "peer connection closed"),
        }
    }
}

impl std::error::Error for PeerError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    NotOpen,
    Closed,
    Send(String),
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::NotOpen => write!(f, "data channel is not open"),
            ChannelError::Closed => write!(f, "data channel closed"),
            ChannelError::Send(e) => write!(f, "data channel send failed: {e}"),
        }
    }
}

impl std::error::Error for ChannelError {}
