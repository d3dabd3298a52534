#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;

use roomdrop::config::Config;
use roomdrop::core::{Engine, EngineEvent, split_events};
use roomdrop::directory::{MemoryRoomDirectory, RoomDirectory, RoomFile};
use roomdrop::log::{LogLevel, LogSink, MemoryLogSink, NoopLogSink};
use roomdrop::peer::mock::MockNetwork;
use roomdrop::rendezvous::LocalRendezvous;
use roomdrop::session::{ConnectionState, SessionEvent};
use roomdrop::signaling::Role;
use roomdrop::transfer::{Direction, TransferEvent};

const SETTINGS: &str = "
[session]
connect_timeout_ms = 30000

[transfer]
chunk_size = 1000
";

fn engine(rv: &LocalRendezvous, net: &MockNetwork, log: Arc<dyn LogSink>) -> Engine {
    let cfg = Config::parse(SETTINGS).unwrap();
    Engine::from_config(&cfg, Arc::new(rv.clone()), Arc::new(net.factory()), log)
}

fn turn(a: &mut Engine, b: &mut Engine) -> (Vec<EngineEvent>, Vec<EngineEvent>) {
    let now = Instant::now();
    (a.poll(now), b.poll(now))
}

fn until_quiet(a: &mut Engine, b: &mut Engine) -> (Vec<EngineEvent>, Vec<EngineEvent>) {
    let (mut ea, mut eb) = (Vec::new(), Vec::new());
    for _ in 0..50 {
        let (x, y) = turn(a, b);
        let quiet = x.is_empty() && y.is_empty();
        ea.extend(x);
        eb.extend(y);
        if quiet && a.outgoing_transfers() == 0 && b.outgoing_transfers() == 0 {
            break;
        }
    }
    (ea, eb)
}

#[test]
fn room_from_directory_to_delivered_file() {
    let directory = MemoryRoomDirectory::new();
    let payload: Bytes = (0..5_500u32).map(|i| (i % 97) as u8).collect::<Vec<_>>().into();
    let code = directory
        .create_room(&[RoomFile::new("samples.bin", payload.len() as u64, "application/octet-stream")])
        .unwrap();
    let listing = directory.room_info(&code).unwrap();

    let rv = LocalRendezvous::new(Arc::new(NoopLogSink));
    let net = MockNetwork::new();
    let mut sender = engine(&rv, &net, Arc::new(NoopLogSink));
    let mut receiver = engine(&rv, &net, Arc::new(NoopLogSink));

    sender.connect(code.as_str(), Role::Initiator).unwrap();
    // The joiner arrives after the offer went out; the relay replays it.
    turn(&mut sender, &mut receiver);
    receiver.connect(&code.as_str().to_lowercase(), Role::Joiner).unwrap();
    let (ea, eb) = until_quiet(&mut sender, &mut receiver);
    assert!(sender.is_connected());
    assert!(receiver.is_connected());
    assert!(ea.contains(&EngineEvent::Session(SessionEvent::PeerJoined(Role::Joiner))));
    assert!(eb.contains(&EngineEvent::Session(SessionEvent::StateChanged(
        ConnectionState::PeerConnected
    ))));

    let offered: Vec<_> = listing.files.iter().map(RoomFile::to_file_info).collect();
    sender.send_file_list(&offered).unwrap();
    let (_, eb) = until_quiet(&mut sender, &mut receiver);
    let (_, transfers, _) = split_events(eb);
    let Some(TransferEvent::FileListReceived(files)) = transfers.first() else {
        panic!("expected a file list, got {transfers:?}");
    };

    receiver.request_file(&files[0].id, &files[0].name).unwrap();
    let (ea, _) = until_quiet(&mut sender, &mut receiver);
    let (_, transfers, _) = split_events(ea);
    assert_eq!(
        transfers,
        vec![TransferEvent::FileRequested {
            file_id: files[0].id.clone(),
            file_name: "samples.bin".into(),
        }]
    );

    let id = sender
        .send_bytes("samples.bin", "application/octet-stream", payload.clone())
        .unwrap();
    let (ea, eb) = until_quiet(&mut sender, &mut receiver);
    let (_, sent, _) = split_events(ea);
    let (_, received, _) = split_events(eb);

    assert!(sent.contains(&TransferEvent::Sent { id: id.clone() }));
    let progress: Vec<f64> = received
        .iter()
        .filter_map(|e| match e {
            TransferEvent::Progress {
                direction: Direction::Receive,
                percent,
                ..
            } => Some(*percent),
            _ => None,
        })
        .collect();
    assert_eq!(progress.len(), 6);
    assert_eq!(progress.last(), Some(&100.0));
    let file = received
        .iter()
        .find_map(|e| match e {
            TransferEvent::Completed(f) => Some(f.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(file.id, id);
    assert_eq!(file.data, payload);
    assert_eq!(receiver.incoming_transfers(), 0);
}

#[test]
fn closing_one_side_stops_the_other_cleanly() {
    let rv = LocalRendezvous::new(Arc::new(NoopLogSink));
    let net = MockNetwork::new();
    let log = Arc::new(MemoryLogSink::new());
    let mut a = engine(&rv, &net, log.clone());
    let mut b = engine(&rv, &net, Arc::new(NoopLogSink));
    a.connect("CL05ED", Role::Initiator).unwrap();
    b.connect("CL05ED", Role::Joiner).unwrap();
    until_quiet(&mut a, &mut b);
    assert!(a.is_connected());

    a.send_text("before close").unwrap();
    let (_, eb) = turn(&mut a, &mut b);
    assert!(!split_events(eb).2.is_empty());

    b.disconnect();
    let (ea, _) = turn(&mut a, &mut b);
    assert!(ea.iter().any(|e| matches!(
        e,
        EngineEvent::Session(SessionEvent::StateChanged(s)) if s.is_terminal()
    )));
    assert!(a.state().is_terminal());
    assert!(a.send_text("after close").is_err());
    assert!(log.contains(LogLevel::Info, "releasing transfers"));
}

#[test]
fn rendezvous_outage_fails_the_attempt() {
    let rv = LocalRendezvous::new(Arc::new(NoopLogSink));
    let net = MockNetwork::new();
    let mut a = engine(&rv, &net, Arc::new(NoopLogSink));
    rv.set_reachable(false);

    assert!(a.connect("0UTAGE", Role::Joiner).is_err());
    assert!(matches!(a.state(), ConnectionState::Failed(_)));
    assert!(a.session().last_error().is_some());

    rv.set_reachable(true);
    a.connect("0UTAGE", Role::Joiner).unwrap();
    a.poll(Instant::now());
    rv.shutdown();
    let events = a.poll(Instant::now());
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::Session(SessionEvent::StateChanged(ConnectionState::Failed(_)))
    )));
}
