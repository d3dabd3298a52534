//! Connection lifecycle for one two-party room: signaling, offer/answer,
//! candidate exchange and the shared data channel.
pub mod connection_state;
#[allow(clippy::module_inception)]
pub mod session;
pub mod session_config;
pub mod session_error;
pub mod session_event;

pub use connection_state::{ConnectionState, FailureReason};
pub use session::Session;
pub use session_config::SessionConfig;
pub use session_error::SessionError;
pub use session_event::{ConnectOutcome, SessionEvent};
