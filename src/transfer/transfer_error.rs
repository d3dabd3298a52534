use std::fmt;
use std::io;

use crate::mux::MuxError;

#[derive(Debug)]
pub enum TransferError {
    /// The shared data channel is not open.
    NotConnected,
    Io(io::Error),
    Mux(MuxError),
    Encode(String),
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::NotConnected => write!(f, "data channel is not open"),
            TransferError::Io(e) => write!(f, "i/o error: {e}"),
            TransferError::Mux(e) => write!(f, "{e}"),
            TransferError::Encode(e) => write!(f, "could not encode message: {e}"),
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransferError::Io(e) => Some(e),
            TransferError::Mux(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TransferError {
    fn from(e: io::Error) -> Self {
        TransferError::Io(e)
    }
}

impl From<MuxError> for TransferError {
    fn from(e: MuxError) -> Self {
        match e {
            MuxError::NotOpen => TransferError::NotConnected,
            other => TransferError::Mux(other),
        }
    }
}

impl From<serde_json::Error> for TransferError {
    fn from(e: serde_json::Error) -> Self {
        TransferError::Encode(e.to_string())
    }
}
