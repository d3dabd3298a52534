#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tungstenite::Message;

use roomdrop::log::{LogSink, NoopLogSink};
use roomdrop::peer::mock::MockNetwork;
use roomdrop::rendezvous::RendezvousServer;
use roomdrop::session::{ConnectionState, Session, SessionConfig, SessionEvent};
use roomdrop::signaling::{Role, SignalEnvelope, WsConnector};

fn start_relay() -> String {
    let log: Arc<dyn LogSink> = Arc::new(NoopLogSink);
    let server = RendezvousServer::bind("127.0.0.1:0", log).unwrap();
    let addr = server.local_addr().unwrap();
    server.spawn().unwrap();
    format!("ws://{addr}/ws/webrtc")
}

fn session(url: &str, net: &MockNetwork) -> Session {
    let log: Arc<dyn LogSink> = Arc::new(NoopLogSink);
    let connector = WsConnector::new(url, log.clone()).with_poll_interval(Duration::from_millis(5));
    Session::new(SessionConfig::default(), Arc::new(connector), Arc::new(net.factory()), log)
}

#[test]
fn two_sessions_pair_through_the_websocket_relay() {
    let url = start_relay();
    let net = MockNetwork::new();
    let mut initiator = session(&url, &net);
    let mut joiner = session(&url, &net);
    let events = initiator.subscribe();

    initiator.connect("WS0001", Role::Initiator).unwrap();
    joiner.connect("WS0001", Role::Joiner).unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        let now = Instant::now();
        initiator.poll(now);
        joiner.poll(now);
        if *initiator.state() == ConnectionState::PeerConnected
            && *joiner.state() == ConnectionState::PeerConnected
        {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(*initiator.state(), ConnectionState::PeerConnected);
    assert_eq!(*joiner.state(), ConnectionState::PeerConnected);
    let seen: Vec<SessionEvent> = events.try_iter().collect();
    assert!(seen.iter().any(|e| matches!(e, SessionEvent::RoomStatus(s) if s.code == "WS0001")));

    initiator.disconnect();
    joiner.disconnect();
}

#[test]
fn relay_refuses_bad_connect_parameters() {
    let url = start_relay();
    let (mut ws, _) = tungstenite::connect(format!("{url}?code=nope&role=initiator")).unwrap();

    let first = loop {
        match ws.read().unwrap() {
            Message::Text(t) => break t,
            _ => continue,
        }
    };
    let env = SignalEnvelope::decode(&first).unwrap();
    assert!(matches!(env, SignalEnvelope::Error(e) if e.message.contains("invalid room code")));
}

#[test]
fn relay_answers_malformed_frames_with_an_error() {
    let url = start_relay();
    let (mut ws, _) = tungstenite::connect(format!("{url}?code=AB12CD&role=joiner")).unwrap();

    let status = SignalEnvelope::decode(&read_text(&mut ws)).unwrap();
    assert!(matches!(status, SignalEnvelope::RoomStatus(s) if s.joiner_online && !s.initiator_online));

    ws.send(Message::text("{not json")).unwrap();
    let reply = SignalEnvelope::decode(&read_text(&mut ws)).unwrap();
    assert!(matches!(reply, SignalEnvelope::Error(_)));
}

fn read_text<S: std::io::Read + std::io::Write>(ws: &mut tungstenite::WebSocket<S>) -> String {
    loop {
        if let Message::Text(t) = ws.read().unwrap() {
            return t;
        }
    }
}
