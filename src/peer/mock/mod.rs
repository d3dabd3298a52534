//! Loopback peer-connection capability. Used by tests and by embedders that
//! want to exercise the protocol stack without a real network.
pub mod mock_channel;
pub mod mock_peer;

pub use mock_channel::MockDataChannel;
pub use mock_peer::{MockNetwork, MockPeer, MockPeerFactory, MockPeerProbe};
