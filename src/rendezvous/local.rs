use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::log::log_sink::LogSink;
use crate::rendezvous::rooms::{ClientId, Outgoing, Rooms};
use crate::signaling::{
    ConnectParams, SignalEnvelope, SignalingConnector, SignalingError, SignalingTransport,
    TransportEvent,
};
use crate::{sink_info, sink_warn};

struct Hub {
    rooms: Rooms,
    clients: HashMap<ClientId, Sender<TransportEvent>>,
    next_id: ClientId,
    reachable: bool,
}

impl Hub {
    fn deliver(&mut self, out: Vec<Outgoing>) {
        for o in out {
            match o {
                Outgoing::Envelope { target, envelope } => {
                    if let Some(tx) = self.clients.get(&target) {
                        let _ = tx.send(TransportEvent::Envelope(envelope));
                    }
                }
                Outgoing::Close { target } => {
                    if let Some(tx) = self.clients.remove(&target) {
                        let _ = tx.send(TransportEvent::Closed("replaced by a newer connection".into()));
                    }
                }
            }
        }
    }
}

/// In-process rendezvous relay and connector: the same room rules as the
/// WebSocket relay, without sockets. Clones share one set of rooms.
#[derive(Clone)]
pub struct LocalRendezvous {
    hub: Arc<Mutex<Hub>>,
    log: Arc<dyn LogSink>,
}

impl LocalRendezvous {
    pub fn new(log: Arc<dyn LogSink>) -> Self {
        let hub = Hub {
            rooms: Rooms::new(log.clone()),
            clients: HashMap::new(),
            next_id: 1,
            reachable: true,
        };
        Self {
            hub: Arc::new(Mutex::new(hub)),
            log,
        }
    }

    /// While unreachable, `open` fails like a refused connection.
    pub fn set_reachable(&self, reachable: bool) {
        if let Ok(mut hub) = self.hub.lock() {
            hub.reachable = reachable;
        }
    }

    pub fn client_count(&self) -> usize {
        self.hub.lock().map(|h| h.clients.len()).unwrap_or(0)
    }

    pub fn room_count(&self) -> usize {
        self.hub.lock().map(|h| h.rooms.room_count()).unwrap_or(0)
    }

    /// Drops every connection as if the relay went away.
    pub fn shutdown(&self) {
        let Ok(mut hub) = self.hub.lock() else {
            return;
        };
        let ids: Vec<ClientId> = hub.clients.keys().copied().collect();
        sink_info!(self.log, "local rendezvous dropping {} connections", ids.len());
        for id in ids {
            hub.rooms.leave(id);
            if let Some(tx) = hub.clients.remove(&id) {
                let _ = tx.send(TransportEvent::Closed("rendezvous went away".into()));
            }
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Hub>, SignalingError> {
        self.hub
            .lock()
            .map_err(|_| SignalingError::Connect("local rendezvous poisoned".into()))
    }
}

impl SignalingConnector for LocalRendezvous {
    fn open(&self, params: &ConnectParams) -> Result<Box<dyn SignalingTransport>, SignalingError> {
        let mut hub = self.lock()?;
        if !hub.reachable {
            return Err(SignalingError::Connect("connection refused".into()));
        }
        let id = hub.next_id;
        hub.next_id += 1;

        let (tx, rx) = mpsc::channel();
        let _ = tx.send(TransportEvent::Opened);
        hub.clients.insert(id, tx);
        let out = hub.rooms.join(id, params);
        hub.deliver(out);

        Ok(Box::new(LocalTransport {
            id,
            hub: self.hub.clone(),
            rx,
            finished: false,
            log: self.log.clone(),
        }))
    }
}

pub struct LocalTransport {
    id: ClientId,
    hub: Arc<Mutex<Hub>>,
    rx: Receiver<TransportEvent>,
    finished: bool,
    log: Arc<dyn LogSink>,
}

impl SignalingTransport for LocalTransport {
    fn send(&mut self, envelope: &SignalEnvelope) -> Result<(), SignalingError> {
        if self.finished {
            return Err(SignalingError::Closed);
        }
        let mut hub = self.hub.lock().map_err(|_| SignalingError::Closed)?;
        if !hub.clients.contains_key(&self.id) {
            return Err(SignalingError::Closed);
        }
        let out = hub.rooms.handle(self.id, envelope.clone());
        hub.deliver(out);
        Ok(())
    }

    fn try_recv(&mut self) -> Option<TransportEvent> {
        if self.finished {
            return None;
        }
        let ev = self.rx.try_recv().ok()?;
        if matches!(ev, TransportEvent::Closed(_) | TransportEvent::Error(_)) {
            self.finished = true;
        }
        Some(ev)
    }

    fn close(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        match self.hub.lock() {
            Ok(mut hub) => {
                hub.clients.remove(&self.id);
                hub.rooms.leave(self.id);
            }
            Err(_) => sink_warn!(self.log, "local rendezvous poisoned on close"),
        }
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        self.close();
    }
}
