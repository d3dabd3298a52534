use crate::session::SessionEvent;
use crate::text::TextEvent;
use crate::transfer::TransferEvent;

/// Everything an [`Engine`](crate::core::engine::Engine) turn reports, in
/// the order it happened within the turn.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Session(SessionEvent),
    Transfer(TransferEvent),
    Text(TextEvent),
}
