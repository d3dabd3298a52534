use std::fmt;

/// Why a session ended up in [`ConnectionState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The joiner did not reach a usable channel in time.
    Timeout,
    InvalidRoomCode(String),
    /// The signaling transport could not be opened.
    SignalingUnavailable(String),
    /// The signaling transport went away before the peer channel opened.
    SignalingClosed(String),
    /// The rendezvous answered with an error envelope.
    Rejected(String),
    PeerSetup(String),
    IceFailed,
    ChannelFailed(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Timeout => write!(f, "timeout"),
            FailureReason::InvalidRoomCode(c) => write!(f, "invalid room code '{c}'"),
            FailureReason::SignalingUnavailable(e) => write!(f, "signaling unavailable: {e}"),
            FailureReason::SignalingClosed(e) => write!(f, "signaling closed: {e}"),
            FailureReason::Rejected(e) => write!(f, "rejected by rendezvous: {e}"),
            FailureReason::PeerSetup(e) => write!(f, "peer connection setup failed: {e}"),
            FailureReason::IceFailed => write!(f, "ice failed"),
            FailureReason::ChannelFailed(e) => write!(f, "data channel failed: {e}"),
        }
    }
}

/// Lifecycle of one session:
/// `Idle -> SignalingOpen -> Negotiating -> PeerConnected -> Closed | Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    /// Signaling transport requested, not yet usable.
    SignalingOpen,
    /// Offer/answer/candidates in flight.
    Negotiating,
    PeerConnected,
    Failed(FailureReason),
    Closed,
}

impl ConnectionState {
    /// A connect attempt is in flight.
    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::SignalingOpen | ConnectionState::Negotiating)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Failed(_) | ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "idle"),
            ConnectionState::SignalingOpen => write!(f, "signaling"),
            ConnectionState::Negotiating => write!(f, "negotiating"),
            ConnectionState::PeerConnected => write!(f, "connected"),
            ConnectionState::Failed(r) => write!(f, "failed ({r})"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}
