//! Capability boundary: what the session needs from a peer-connection
//! stack, plus an in-process loopback implementation.
pub mod data_channel;
pub mod mock;
pub mod peer_connection;
pub mod peer_error;
pub mod signaling_state;

pub use data_channel::{ChannelEvent, ChannelState, DataChannel, Frame};
pub use peer_connection::{PeerConnection, PeerEvent, PeerFactory};
pub use peer_error::{ChannelError, PeerError};
pub use signaling_state::{PeerConnectionState, SdpType, SignalingState};
