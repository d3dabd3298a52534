use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Instant;

use bytes::Bytes;

use crate::log::log_sink::LogSink;
use crate::mux::{ChannelHost, ChannelMessage, ChannelSignal, Multiplexer, MuxSender, Unregister};
use crate::peer::{
    DataChannel, PeerConnection, PeerConnectionState, PeerError, PeerEvent, PeerFactory, SdpType,
    SignalingState,
};
use crate::session::{
    connection_state::{ConnectionState, FailureReason},
    session_config::SessionConfig,
    session_error::SessionError,
    session_event::{ConnectOutcome, SessionEvent},
};
use crate::signaling::{
    ConnectParams, IceCandidate, Role, RoomCode, SignalEnvelope, SignalingConnector,
    SignalingTransport, TransportEvent,
};
use crate::{sink_debug, sink_error, sink_info, sink_warn};

/// Everything that belongs to one connect attempt. Dropped as a unit on
/// teardown, so no timer or queue outlives the attempt.
struct Attempt {
    params: ConnectParams,
    transport: Option<Box<dyn SignalingTransport>>,
    peer: Option<Box<dyn PeerConnection>>,
    /// Joiner only.
    deadline: Option<Instant>,
    /// Initiator only: send the offer at this point even if gathering runs on.
    offer_deadline: Option<Instant>,
    offer_sent: bool,
    /// Remote candidates that arrived before the remote description.
    pending_candidates: VecDeque<IceCandidate>,
    channel_ever_open: bool,
}

/// Connection state machine for one two-party room.
///
/// Owns the signaling transport, the peer connection and the multiplexer.
/// Nothing happens on its own: the embedder calls [`poll`](Self::poll)
/// regularly and every transition, timer and dispatch runs inside that call.
pub struct Session {
    cfg: SessionConfig,
    connector: Arc<dyn SignalingConnector>,
    factory: Arc<dyn PeerFactory>,
    log: Arc<dyn LogSink>,
    state: ConnectionState,
    attempt: Option<Attempt>,
    mux: Multiplexer,
    subscribers: Vec<Sender<SessionEvent>>,
    last_error: Option<FailureReason>,
}

impl Session {
    pub fn new(
        cfg: SessionConfig,
        connector: Arc<dyn SignalingConnector>,
        factory: Arc<dyn PeerFactory>,
        log: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            cfg,
            connector,
            factory,
            mux: Multiplexer::new(log.clone()),
            log,
            state: ConnectionState::Idle,
            attempt: None,
            subscribers: Vec::new(),
            last_error: None,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Reason of the most recent failure, cleared by a successful `connect`.
    pub fn last_error(&self) -> Option<&FailureReason> {
        self.last_error.as_ref()
    }

    pub fn room(&self) -> Option<(&RoomCode, Role)> {
        self.attempt
            .as_ref()
            .map(|a| (&a.params.code, a.params.role))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.cfg
    }

    /// Every event from now on is delivered to the returned receiver.
    pub fn subscribe(&mut self) -> Receiver<SessionEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn register_handler<F>(&self, channel: &str, handler: F) -> Unregister
    where
        F: FnMut(&ChannelMessage) + Send + 'static,
    {
        self.mux.register_handler(channel, handler)
    }

    pub fn register_data_handler<F>(&self, channel: &str, handler: F) -> Unregister
    where
        F: FnMut(Bytes) + Send + 'static,
    {
        self.mux.register_data_handler(channel, handler)
    }

    pub fn set_default_data_handler<F>(&self, handler: F) -> Unregister
    where
        F: FnMut(Bytes) + Send + 'static,
    {
        self.mux.set_default_data_handler(handler)
    }

    pub fn sender(&self) -> MuxSender {
        self.mux.sender()
    }

    pub fn connect(&mut self, code: &str, role: Role) -> Result<ConnectOutcome, SessionError> {
        self.connect_at(code, role, Instant::now())
    }

    /// `connect` with an explicit clock reading for the joiner deadline.
    pub fn connect_at(
        &mut self,
        code: &str,
        role: Role,
        now: Instant,
    ) -> Result<ConnectOutcome, SessionError> {
        let code = match RoomCode::parse(code) {
            Ok(c) => c,
            Err(_) => {
                sink_warn!(self.log, "connect rejected: invalid room code '{}'", code);
                self.last_error = Some(FailureReason::InvalidRoomCode(code.to_string()));
                return Err(SessionError::InvalidRoomCode(code.to_string()));
            }
        };

        if self.state.is_connecting() {
            sink_warn!(
                self.log,
                "connect({}, {}) ignored: an attempt is already in flight",
                code,
                role
            );
            return Ok(ConnectOutcome::AlreadyInProgress);
        }

        if self.state == ConnectionState::PeerConnected {
            let same = self
                .room()
                .is_some_and(|(c, r)| *c == code && r == role);
            if same {
                sink_debug!(self.log, "already connected to {} as {}", code, role);
                return Ok(ConnectOutcome::AlreadyConnected);
            }
            sink_info!(self.log, "switching to room {}: closing current session", code);
            self.teardown();
            self.set_state(ConnectionState::Closed);
        }

        let mut params = ConnectParams::new(code, role);
        if let Some(ch) = &self.cfg.signaling_channel {
            params = params.with_channel(ch.clone());
        }

        let transport = match self.connector.open(&params) {
            Ok(t) => t,
            Err(e) => {
                self.fail(FailureReason::SignalingUnavailable(e.to_string()));
                return Err(SessionError::Signaling(e));
            }
        };

        let deadline = match role {
            Role::Joiner => Some(now + self.cfg.connect_timeout_for(self.factory.negotiates_slowly())),
            Role::Initiator => None,
        };

        sink_info!(self.log, "connecting to room {} as {}", params.code, role);
        self.attempt = Some(Attempt {
            params,
            transport: Some(transport),
            peer: None,
            deadline,
            offer_deadline: None,
            offer_sent: false,
            pending_candidates: VecDeque::new(),
            channel_ever_open: false,
        });
        self.last_error = None;
        self.set_state(ConnectionState::SignalingOpen);
        Ok(ConnectOutcome::Started)
    }

    /// Releases transport, peer connection and channel and moves to `Closed`.
    /// A no-op in `Idle` and `Closed`.
    pub fn disconnect(&mut self) {
        if matches!(self.state, ConnectionState::Idle | ConnectionState::Closed) {
            sink_debug!(self.log, "disconnect in state {}: nothing to do", self.state);
            return;
        }
        sink_info!(self.log, "disconnecting (state was {})", self.state);
        self.teardown();
        self.set_state(ConnectionState::Closed);
    }

    /// Runs one turn of the event loop: signaling, peer events, channel
    /// frames, then timers.
    pub fn poll(&mut self, now: Instant) {
        self.drain_transport(now);
        self.drain_peer();
        self.pump_channel();
        self.run_timers(now);
    }

    /// Applies one inbound signaling envelope. Envelopes that do not fit the
    /// current negotiation state are logged and dropped.
    pub fn handle_signal(&mut self, env: SignalEnvelope) {
        match env {
            SignalEnvelope::Offer(d) => self.on_remote_offer(&d.sdp),
            SignalEnvelope::Answer(d) => self.on_remote_answer(&d.sdp),
            SignalEnvelope::IceCandidate(c) => self.on_remote_candidate(c),
            SignalEnvelope::PeerJoined(p) => {
                sink_info!(self.log, "peer joined the room as {}", p.role);
                self.emit(SessionEvent::PeerJoined(p.role));
            }
            SignalEnvelope::RoomStatus(s) => {
                sink_debug!(
                    self.log,
                    "room {} status: initiator={} joiner={}",
                    s.code,
                    s.initiator_online,
                    s.joiner_online
                );
                self.emit(SessionEvent::RoomStatus(s));
            }
            SignalEnvelope::Error(e) => {
                sink_warn!(self.log, "rendezvous error: {}", e.message);
                self.emit(SessionEvent::SignalingError(e.message.clone()));
                if self.state.is_connecting() {
                    self.fail(FailureReason::Rejected(e.message));
                }
            }
        }
    }

    fn drain_transport(&mut self, now: Instant) {
        loop {
            let ev = match self.attempt.as_mut().and_then(|a| a.transport.as_mut()) {
                Some(t) => t.try_recv(),
                None => return,
            };
            let Some(ev) = ev else {
                return;
            };
            self.handle_transport_event(ev, now);
        }
    }

    fn handle_transport_event(&mut self, ev: TransportEvent, now: Instant) {
        match ev {
            TransportEvent::Opened => {
                if self.state == ConnectionState::SignalingOpen {
                    self.begin_negotiation(now);
                } else {
                    sink_debug!(self.log, "transport opened in state {}; ignored", self.state);
                }
            }
            TransportEvent::Envelope(env) => {
                sink_debug!(self.log, "signal in: {}", env.kind());
                self.handle_signal(env);
            }
            TransportEvent::Closed(reason) | TransportEvent::Error(reason) => {
                if self.state == ConnectionState::PeerConnected {
                    sink_info!(
                        self.log,
                        "signaling ended after connect ({}); peer channel stays up",
                        reason
                    );
                    if let Some(mut t) = self.attempt.as_mut().and_then(|a| a.transport.take()) {
                        t.close();
                    }
                } else {
                    self.fail(FailureReason::SignalingClosed(reason));
                }
            }
        }
    }

    fn begin_negotiation(&mut self, now: Instant) {
        let Some(role) = self.attempt.as_ref().map(|a| a.params.role) else {
            return;
        };
        let mut peer = match self.factory.create() {
            Ok(p) => p,
            Err(e) => {
                self.fail(FailureReason::PeerSetup(e.to_string()));
                return;
            }
        };

        if role == Role::Initiator {
            if let Err(e) = start_offer(peer.as_mut(), &self.mux, &self.cfg.data_channel_label) {
                peer.close();
                self.fail(FailureReason::PeerSetup(e.to_string()));
                return;
            }
            sink_debug!(self.log, "local offer set; gathering candidates");
        }

        if let Some(a) = self.attempt.as_mut() {
            a.peer = Some(peer);
            if role == Role::Initiator {
                a.offer_deadline = Some(now + self.cfg.ice_gather_timeout);
            }
        }
        self.set_state(ConnectionState::Negotiating);
    }

    fn on_remote_offer(&mut self, sdp: &str) {
        let log = &self.log;
        let Some(a) = self.attempt.as_mut() else {
            sink_warn!(log, "dropping offer: no active session");
            return;
        };
        let Some(peer) = a.peer.as_mut() else {
            sink_warn!(log, "dropping offer: negotiation not started");
            return;
        };
        let st = peer.signaling_state();
        if st != SignalingState::Stable {
            sink_warn!(log, "dropping offer received in signaling state {:?}", st);
            return;
        }
        if let Err(e) = peer.set_remote_description(SdpType::Offer, sdp) {
            sink_warn!(log, "dropping offer the peer connection rejected: {}", e);
            return;
        }
        flush_candidates(a, log);

        let answer = match answer_offer(a) {
            Ok(sdp) => sdp,
            Err(e) => {
                self.fail(FailureReason::PeerSetup(e.to_string()));
                return;
            }
        };
        send_envelope(a, &SignalEnvelope::answer(answer), log);
    }

    fn on_remote_answer(&mut self, sdp: &str) {
        let log = &self.log;
        let Some(a) = self.attempt.as_mut() else {
            sink_warn!(log, "dropping answer in state {}", self.state);
            return;
        };
        if !a.offer_sent {
            sink_warn!(log, "dropping answer: no offer has been sent yet");
            return;
        }
        let Some(peer) = a.peer.as_mut() else {
            sink_warn!(log, "dropping answer in state {}", self.state);
            return;
        };
        let st = peer.signaling_state();
        if st != SignalingState::HaveLocalOffer {
            sink_warn!(log, "dropping answer received in signaling state {:?}", st);
            return;
        }
        if let Err(e) = peer.set_remote_description(SdpType::Answer, sdp) {
            sink_warn!(log, "dropping answer the peer connection rejected: {}", e);
            return;
        }
        if let Some(a) = self.attempt.as_mut() {
            flush_candidates(a, log);
        }
    }

    fn on_remote_candidate(&mut self, candidate: IceCandidate) {
        let log = &self.log;
        let Some(a) = self.attempt.as_mut() else {
            sink_warn!(log, "dropping ice candidate: no active session");
            return;
        };
        let Some(peer) = a.peer.as_mut() else {
            sink_warn!(log, "dropping ice candidate: negotiation not started");
            return;
        };
        if peer.has_remote_description() {
            if let Err(e) = peer.add_ice_candidate(&candidate) {
                sink_warn!(log, "ice candidate rejected: {}", e);
            }
        } else {
            a.pending_candidates.push_back(candidate);
            sink_debug!(
                log,
                "buffered ice candidate until remote description ({} queued)",
                a.pending_candidates.len()
            );
        }
    }

    fn drain_peer(&mut self) {
        loop {
            let ev = match self.attempt.as_mut().and_then(|a| a.peer.as_mut()) {
                Some(p) => p.poll_event(),
                None => return,
            };
            let Some(ev) = ev else {
                return;
            };
            self.handle_peer_event(ev);
        }
    }

    fn handle_peer_event(&mut self, ev: PeerEvent) {
        match ev {
            PeerEvent::LocalCandidate(c) => {
                if let Some(a) = self.attempt.as_mut() {
                    send_envelope(a, &SignalEnvelope::IceCandidate(c), &self.log);
                }
            }
            PeerEvent::GatheringComplete => {
                let is_initiator = self
                    .attempt
                    .as_ref()
                    .is_some_and(|a| a.params.role == Role::Initiator);
                if is_initiator {
                    sink_debug!(self.log, "candidate gathering complete");
                    self.send_offer();
                }
            }
            PeerEvent::ConnectionState(s) => self.on_peer_state(s),
            PeerEvent::DataChannel(ch) => self.on_remote_channel(ch),
        }
    }

    fn on_peer_state(&mut self, s: PeerConnectionState) {
        match s {
            PeerConnectionState::Failed => {
                let channel_open = self.attempt.as_ref().is_some_and(|a| a.channel_ever_open);
                if channel_open {
                    // Heuristic kept for compatibility: lower layers sometimes
                    // report failure while the channel keeps working.
                    sink_warn!(
                        self.log,
                        "ignoring peer connection 'failed' report: data channel is open"
                    );
                } else {
                    self.fail(FailureReason::IceFailed);
                }
            }
            PeerConnectionState::Closed if self.state == ConnectionState::PeerConnected => {
                sink_info!(self.log, "peer connection closed by remote");
                self.teardown();
                self.set_state(ConnectionState::Closed);
            }
            other => sink_debug!(self.log, "peer connection state {:?}", other),
        }
    }

    fn on_remote_channel(&mut self, ch: Arc<dyn DataChannel>) {
        if ch.label() != self.cfg.data_channel_label {
            sink_warn!(self.log, "closing unexpected data channel '{}'", ch.label());
            ch.close();
            return;
        }
        self.mux.attach(ch);
    }

    fn pump_channel(&mut self) {
        if self.attempt.is_none() {
            return;
        }
        for signal in self.mux.pump() {
            match signal {
                ChannelSignal::Opened => {
                    if let Some(a) = self.attempt.as_mut() {
                        a.channel_ever_open = true;
                        a.deadline = None;
                    }
                    if self.state == ConnectionState::Negotiating {
                        if let Some((code, role)) = self.room() {
                            sink_info!(self.log, "peer channel open in room {} as {}", code, role);
                        }
                        self.set_state(ConnectionState::PeerConnected);
                    }
                }
                ChannelSignal::Closed => {
                    if self.state == ConnectionState::PeerConnected {
                        sink_info!(self.log, "data channel closed by remote");
                        self.teardown();
                        self.set_state(ConnectionState::Closed);
                    } else if self.state.is_connecting() {
                        self.fail(FailureReason::ChannelFailed("closed before open".into()));
                    }
                }
                ChannelSignal::Error(e) => {
                    if !self.state.is_terminal() {
                        self.fail(FailureReason::ChannelFailed(e));
                    }
                }
            }
            if self.attempt.is_none() {
                break;
            }
        }
    }

    fn run_timers(&mut self, now: Instant) {
        let Some(a) = self.attempt.as_ref() else {
            return;
        };
        let timed_out = self.state.is_connecting() && a.deadline.is_some_and(|d| now >= d);
        let offer_due = !a.offer_sent && a.offer_deadline.is_some_and(|d| now >= d);

        if timed_out {
            self.fail(FailureReason::Timeout);
            return;
        }
        if offer_due {
            sink_warn!(
                self.log,
                "candidate gathering still running after {:?}; sending offer with candidates so far",
                self.cfg.ice_gather_timeout
            );
            self.send_offer();
        }
    }

    /// Sends the local offer once per attempt.
    fn send_offer(&mut self) {
        let log = &self.log;
        let Some(a) = self.attempt.as_mut() else {
            return;
        };
        if a.offer_sent {
            return;
        }
        let Some(sdp) = a.peer.as_ref().and_then(|p| p.local_description()) else {
            sink_warn!(log, "no local description to offer");
            return;
        };
        a.offer_sent = true;
        a.offer_deadline = None;
        send_envelope(a, &SignalEnvelope::offer(sdp), log);
    }

    fn fail(&mut self, reason: FailureReason) {
        sink_error!(self.log, "session failed: {}", reason);
        self.teardown();
        self.last_error = Some(reason.clone());
        self.set_state(ConnectionState::Failed(reason));
    }

    fn teardown(&mut self) {
        if let Some(mut a) = self.attempt.take() {
            if let Some(t) = a.transport.as_mut() {
                t.close();
            }
            if let Some(p) = a.peer.as_mut() {
                p.close();
            }
        }
        self.mux.detach();
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        sink_debug!(self.log, "state {} -> {}", self.state, next);
        self.state = next.clone();
        self.emit(SessionEvent::StateChanged(next));
    }

    fn emit(&mut self, ev: SessionEvent) {
        self.subscribers.retain(|tx| tx.send(ev.clone()).is_ok());
    }
}

impl ChannelHost for Session {
    fn register_handler<F>(&self, channel: &str, handler: F) -> Unregister
    where
        F: FnMut(&ChannelMessage) + Send + 'static,
    {
        Session::register_handler(self, channel, handler)
    }

    fn register_data_handler<F>(&self, channel: &str, handler: F) -> Unregister
    where
        F: FnMut(Bytes) + Send + 'static,
    {
        Session::register_data_handler(self, channel, handler)
    }

    fn sender(&self) -> MuxSender {
        Session::sender(self)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn start_offer(
    peer: &mut dyn PeerConnection,
    mux: &Multiplexer,
    label: &str,
) -> Result<(), PeerError> {
    let ch = peer.create_data_channel(label)?;
    mux.attach(ch);
    let offer = peer.create_offer()?;
    peer.set_local_description(SdpType::Offer, &offer)
}

fn answer_offer(a: &mut Attempt) -> Result<String, PeerError> {
    let peer = a.peer.as_mut().ok_or(PeerError::Closed)?;
    let answer = peer.create_answer()?;
    peer.set_local_description(SdpType::Answer, &answer)?;
    Ok(peer.local_description().unwrap_or(answer))
}

/// Applies queued remote candidates in arrival order.
fn flush_candidates(a: &mut Attempt, log: &Arc<dyn LogSink>) {
    let Some(peer) = a.peer.as_mut() else {
        return;
    };
    if !a.pending_candidates.is_empty() {
        sink_debug!(log, "applying {} buffered ice candidates", a.pending_candidates.len());
    }
    while let Some(c) = a.pending_candidates.pop_front() {
        if let Err(e) = peer.add_ice_candidate(&c) {
            sink_warn!(log, "buffered ice candidate rejected: {}", e);
        }
    }
}

fn send_envelope(a: &mut Attempt, env: &SignalEnvelope, log: &Arc<dyn LogSink>) {
    let Some(t) = a.transport.as_mut() else {
        sink_debug!(log, "no signaling transport; dropping outbound {}", env.kind());
        return;
    };
    match t.send(env) {
        Ok(()) => sink_debug!(log, "signal out: {}", env.kind()),
        Err(e) => sink_warn!(log, "could not send {}: {}", env.kind(), e),
    }
}
