use crate::signaling::{
    connect_params::ConnectParams, envelope::SignalEnvelope, signaling_error::SignalingError,
};

/// What a signaling transport reports to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection to the rendezvous is usable.
    Opened,
    Envelope(SignalEnvelope),
    /// The rendezvous or the network closed the connection.
    Closed(String),
    /// Transport-level failure; the transport is unusable afterwards.
    Error(String),
}

/// An ordered bidirectional channel to the rendezvous carrying envelopes.
///
/// Implementations never block: `send` enqueues, `try_recv` drains what has
/// already arrived. Events are delivered in arrival order.
pub trait SignalingTransport: Send {
    fn send(&mut self, envelope: &SignalEnvelope) -> Result<(), SignalingError>;
    fn try_recv(&mut self) -> Option<TransportEvent>;
    /// Idempotent.
    fn close(&mut self);
}

/// Opens signaling transports. The returned transport reports
/// [`TransportEvent::Opened`] once the rendezvous accepted the connection.
pub trait SignalingConnector: Send + Sync {
    fn open(&self, params: &ConnectParams) -> Result<Box<dyn SignalingTransport>, SignalingError>;
}
