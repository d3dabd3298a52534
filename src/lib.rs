//! roomdrop: two-party peer-to-peer file and text exchange keyed by a
//! short room code.
//!
//! A [`core::Engine`] pairs with the other side of a room through a
//! rendezvous relay, negotiates a peer data channel, and multiplexes the
//! chunked file transfer and text sync protocols over it. The
//! `rendezvous_server` binary runs the relay.

/// INI-style settings file.
pub mod config;
/// Poll-driven endpoint tying the session to its business layers.
pub mod core;
/// HTTP client for the room directory.
pub mod directory;
/// Leveled logging sinks and the file logger.
pub mod log;
/// Logical channels over the single peer data channel.
pub mod mux;
/// Peer connection capability and its loopback implementation.
pub mod peer;
/// Signaling relay pairing the two sides of a room.
pub mod rendezvous;
/// Connection state machine.
pub mod session;
/// Room codes, roles, envelopes and signaling transports.
pub mod signaling;
/// Text mirroring and typing indicator.
pub mod text;
/// Chunked file transfer.
pub mod transfer;
