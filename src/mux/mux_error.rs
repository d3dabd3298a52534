use std::fmt;

use crate::peer::peer_error::ChannelError;

/// Why a send through the multiplexer did not reach the physical channel.
#[derive(Debug, Clone, PartialEq)]
pub enum MuxError {
    NotOpen,
    Encode(String),
    Channel(ChannelError),
}

impl fmt::Display for MuxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MuxError::NotOpen => write!(f, "data channel is not open"),
            MuxError::Encode(e) => write!(f, "could not encode message: {e}"),
            MuxError::Channel(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for MuxError {}

impl From<ChannelError> for MuxError {
    fn from(e: ChannelError) -> Self {
        MuxError::Channel(e)
    }
}
