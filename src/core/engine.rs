use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Instant;

use bytes::Bytes;

use crate::config::Config;
use crate::core::events::EngineEvent;
use crate::log::log_sink::LogSink;
use crate::mux::MuxError;
use crate::peer::PeerFactory;
use crate::session::{
    ConnectOutcome, ConnectionState, Session, SessionConfig, SessionError, SessionEvent,
};
use crate::signaling::{Role, SignalingConnector};
use crate::text::{TextEvent, TextSync};
use crate::transfer::{FileInfo, FileTransfer, TransferConfig, TransferError, TransferEvent};
use crate::{sink_debug, sink_info};

/// One peer endpoint: a [`Session`] plus the file and text layers riding on
/// its data channel.
///
/// Single-threaded. Call [`poll`](Self::poll) regularly; every event of the
/// turn comes back from it.
pub struct Engine {
    session: Session,
    session_events: Receiver<SessionEvent>,
    files: FileTransfer,
    text: TextSync,
    log: Arc<dyn LogSink>,
}

impl Engine {
    pub fn new(
        session_cfg: SessionConfig,
        transfer_cfg: TransferConfig,
        connector: Arc<dyn SignalingConnector>,
        factory: Arc<dyn PeerFactory>,
        log: Arc<dyn LogSink>,
    ) -> Self {
        let mut session = Session::new(session_cfg, connector, factory, log.clone());
        let session_events = session.subscribe();
        let files = FileTransfer::attach(&session, transfer_cfg, log.clone());
        let text = TextSync::attach(&session, log.clone());
        Self {
            session,
            session_events,
            files,
            text,
            log,
        }
    }

    /// Builds the session and transfer settings from `[session]`,
    /// `[signaling]` and `[transfer]`.
    pub fn from_config(
        cfg: &Config,
        connector: Arc<dyn SignalingConnector>,
        factory: Arc<dyn PeerFactory>,
        log: Arc<dyn LogSink>,
    ) -> Self {
        let session_cfg = SessionConfig::from_config(cfg, log.as_ref());
        let transfer_cfg = TransferConfig::from_config(cfg, log.as_ref());
        Self::new(session_cfg, transfer_cfg, connector, factory, log)
    }

    pub fn state(&self) -> &ConnectionState {
        self.session.state()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_connected(&self) -> bool {
        *self.session.state() == ConnectionState::PeerConnected
    }

    pub fn connect(&mut self, code: &str, role: Role) -> Result<ConnectOutcome, SessionError> {
        self.connect_at(code, role, Instant::now())
    }

    pub fn connect_at(&mut self, code: &str, role: Role, now: Instant) -> Result<ConnectOutcome, SessionError> {
        let outcome = self.session.connect_at(code, role, now)?;
        if outcome == ConnectOutcome::Started {
            self.reset_layers();
        }
        Ok(outcome)
    }

    pub fn disconnect(&mut self) {
        self.session.disconnect();
        self.reset_layers();
    }

    pub fn send_file(&mut self, path: impl AsRef<Path>) -> Result<String, TransferError> {
        self.require_connected()?;
        self.files.send_file(path)
    }

    pub fn send_bytes(&mut self, name: &str, mime_type: &str, data: Bytes) -> Result<String, TransferError> {
        self.require_connected()?;
        self.files.send_bytes(name, mime_type, data)
    }

    pub fn request_file(&self, file_id: &str, file_name: &str) -> Result<(), TransferError> {
        self.require_connected()?;
        self.files.request_file(file_id, file_name)
    }

    pub fn send_file_list(&self, files: &[FileInfo]) -> Result<(), TransferError> {
        self.require_connected()?;
        self.files.send_file_list(files)
    }

    pub fn send_text(&self, text: &str) -> Result<(), MuxError> {
        if !self.is_connected() {
            return Err(MuxError::NotOpen);
        }
        self.text.send_text(text)
    }

    pub fn send_typing(&self, typing: bool) -> Result<(), MuxError> {
        if !self.is_connected() {
            return Err(MuxError::NotOpen);
        }
        self.text.send_typing(typing)
    }

    /// Last text the peer synced.
    pub fn remote_text(&self) -> &str {
        self.text.remote_text()
    }

    pub fn outgoing_transfers(&self) -> usize {
        self.files.outgoing_len()
    }

    pub fn incoming_transfers(&self) -> usize {
        self.files.incoming_len()
    }

    /// One turn: session (signaling, peer, channel dispatch, timers), then
    /// the business layers. A turn that ends the session releases every
    /// transfer and reports nothing further for them.
    pub fn poll(&mut self, now: Instant) -> Vec<EngineEvent> {
        self.session.poll(now);

        let mut out = Vec::new();
        let mut ended = false;
        while let Ok(ev) = self.session_events.try_recv() {
            if let SessionEvent::StateChanged(s) = &ev {
                ended |= s.is_terminal();
            }
            out.push(EngineEvent::Session(ev));
        }
        if ended {
            sink_info!(self.log, "session ended ({}); releasing transfers", self.session.state());
            self.reset_layers();
            return out;
        }

        out.extend(self.text.poll().into_iter().map(EngineEvent::Text));
        out.extend(self.files.poll().into_iter().map(EngineEvent::Transfer));
        out
    }

    fn require_connected(&self) -> Result<(), TransferError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(TransferError::NotConnected)
        }
    }

    fn reset_layers(&mut self) {
        sink_debug!(self.log, "resetting transfer and text layers");
        self.files.reset();
        self.text.reset();
    }
}

/// Splits a turn's events by layer; handy for embedders that route them.
pub fn split_events(events: Vec<EngineEvent>) -> (Vec<SessionEvent>, Vec<TransferEvent>, Vec<TextEvent>) {
    let (mut s, mut t, mut x) = (Vec::new(), Vec::new(), Vec::new());
    for ev in events {
        match ev {
            EngineEvent::Session(e) => s.push(e),
            EngineEvent::Transfer(e) => t.push(e),
            EngineEvent::Text(e) => x.push(e),
        }
    }
    (s, t, x)
}
