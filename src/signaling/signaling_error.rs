use std::fmt;

use crate::signaling::envelope::EnvelopeError;

#[derive(Debug)]
pub enum SignalingError {
    InvalidRoomCode(String),
    InvalidRole(String),
    MissingParam(&'static str),
    Connect(String),
    Closed,
    Envelope(EnvelopeError),
}

impl fmt::Display for SignalingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalingError::InvalidRoomCode(c) => {
                write!(f, "invalid room code '{c}': expected 6 characters A-Z or 0-9")
            }
            SignalingError::InvalidRole(r) => write!(f, "invalid role '{r}'"),
            SignalingError::MissingParam(p) => write!(f, "missing connect parameter '{p}'"),
            SignalingError::Connect(e) => write!(f, "signaling connect failed: {e}"),
            SignalingError::Closed => write!(f, "signaling transport closed"),
            SignalingError::Envelope(e) => write!(f, "signaling envelope error: {e}"),
        }
    }
}

impl std::error::Error for SignalingError {}

impl From<EnvelopeError> for SignalingError {
    fn from(e: EnvelopeError) -> Self {
        SignalingError::Envelope(e)
    }
}
