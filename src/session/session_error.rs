use std::fmt;

use crate::signaling::signaling_error::SignalingError;

#[derive(Debug)]
pub enum SessionError {
    InvalidRoomCode(String),
    Signaling(SignalingError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::InvalidRoomCode(c) => write!(f, "invalid room code '{c}'"),
            SessionError::Signaling(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<SignalingError> for SessionError {
    fn from(e: SignalingError) -> Self {
        SessionError::Signaling(e)
    }
}
