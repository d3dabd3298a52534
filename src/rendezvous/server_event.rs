use std::sync::mpsc::Sender;

use crate::rendezvous::rooms::ClientId;
use crate::signaling::{ConnectParams, SignalEnvelope};

/// Events sent *to* the central relay thread.
pub enum ServerEvent {
    /// A connection completed its handshake with valid parameters.
    Register {
        client_id: ClientId,
        params: ConnectParams,
        to_client: Sender<ConnCommand>,
    },
    Envelope {
        client_id: ClientId,
        envelope: SignalEnvelope,
    },
    /// The socket closed or errored.
    Disconnected { client_id: ClientId },
}

/// Instructions from the relay thread to one connection thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnCommand {
    Send(String),
    Close,
}
