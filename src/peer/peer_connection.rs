use std::sync::Arc;

use crate::peer::{
    data_channel::DataChannel,
    peer_error::PeerError,
    signaling_state::{PeerConnectionState, SdpType, SignalingState},
};
use crate::signaling::envelope::IceCandidate;

/// Asynchronous notifications from a peer connection.
pub enum PeerEvent {
    LocalCandidate(IceCandidate),
    GatheringComplete,
    ConnectionState(PeerConnectionState),
    /// The remote side opened a channel towards us.
    DataChannel(Arc<dyn DataChannel>),
}

impl std::fmt::Debug for PeerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerEvent::LocalCandidate(c) => f.debug_tuple("LocalCandidate").field(c).finish(),
            PeerEvent::GatheringComplete => f.write_str("GatheringComplete"),
            PeerEvent::ConnectionState(s) => f.debug_tuple("ConnectionState").field(s).finish(),
            PeerEvent::DataChannel(ch) => f.debug_tuple("DataChannel").field(&ch.label()).finish(),
        }
    }
}

/// The peer-connection capability the session drives. Descriptions are
/// opaque SDP strings; connectivity itself is the implementation's business.
pub trait PeerConnection: Send {
    fn create_offer(&mut self) -> Result<String, PeerError>;
    fn create_answer(&mut self) -> Result<String, PeerError>;
    fn set_local_description(&mut self, kind: SdpType, sdp: &str) -> Result<(), PeerError>;
    fn set_remote_description(&mut self, kind: SdpType, sdp: &str) -> Result<(), PeerError>;
    /// Fails when no remote description is set yet.
    fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> Result<(), PeerError>;
    fn signaling_state(&self) -> SignalingState;
    fn has_remote_description(&self) -> bool;
    /// Current local description including candidates gathered so far.
    fn local_description(&self) -> Option<String>;
    fn create_data_channel(&mut self, label: &str) -> Result<Arc<dyn DataChannel>, PeerError>;
    fn poll_event(&mut self) -> Option<PeerEvent>;
    fn close(&mut self);
}

pub trait PeerFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn PeerConnection>, PeerError>;

    /// Stacks known to negotiate slowly get a longer connect timeout.
    fn negotiates_slowly(&self) -> bool {
        false
    }
}
