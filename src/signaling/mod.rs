//! Signaling plumbing between a peer and the rendezvous: room codes, roles,
//! the JSON envelope codec and the transports that carry it.
pub mod connect_params;
pub mod envelope;
pub mod role;
pub mod room_code;
pub mod signaling_config;
pub mod signaling_error;
pub mod transport;
pub mod ws_transport;

pub use connect_params::ConnectParams;
pub use envelope::{IceCandidate, SessionDescription, SignalEnvelope};
pub use role::Role;
pub use room_code::RoomCode;
pub use signaling_config::SignalingConfig;
pub use signaling_error::SignalingError;
pub use transport::{SignalingConnector, SignalingTransport, TransportEvent};
pub use ws_transport::WsConnector;
