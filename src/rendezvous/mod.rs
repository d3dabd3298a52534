//! Rendezvous relay: pairs one initiator and one joiner per room code and
//! forwards signaling envelopes between them.

pub mod local;
pub mod relay_loop;
pub mod rooms;
pub mod server;
pub mod server_event;

pub use local::LocalRendezvous;
pub use rooms::{ClientId, Outgoing, Rooms};
pub use server::{RendezvousConfig, RendezvousServer};
