use crate::session::connection_state::ConnectionState;
use crate::signaling::{envelope::RoomStatus, role::Role};

/// Observable session activity, delivered to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(ConnectionState),
    PeerJoined(Role),
    RoomStatus(RoomStatus),
    /// Error envelope from the rendezvous.
    SignalingError(String),
}

/// Result of a `connect` call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Started,
    /// An attempt is already running; nothing was changed.
    AlreadyInProgress,
    /// Already connected to the same room with the same role.
    AlreadyConnected,
}
