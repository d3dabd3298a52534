use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender};

use crate::log::log_sink::LogSink;
use crate::rendezvous::{
    rooms::{ClientId, Outgoing, Rooms},
    server_event::{ConnCommand, ServerEvent},
};
use crate::{sink_debug, sink_info, sink_warn};

/// Central relay loop: owns the `Rooms` and one sender per connection.
/// Returns once every event sender is gone.
pub fn run_relay_loop(mut rooms: Rooms, log: Arc<dyn LogSink>, rx: Receiver<ServerEvent>) {
    let mut clients: HashMap<ClientId, Sender<ConnCommand>> = HashMap::new();

    while let Ok(ev) = rx.recv() {
        let out = match ev {
            ServerEvent::Register {
                client_id,
                params,
                to_client,
            } => {
                clients.insert(client_id, to_client);
                sink_debug!(log, "registered client {} ({} connected)", client_id, clients.len());
                rooms.join(client_id, &params)
            }
            ServerEvent::Envelope {
                client_id,
                envelope,
            } => rooms.handle(client_id, envelope),
            ServerEvent::Disconnected { client_id } => {
                clients.remove(&client_id);
                rooms.leave(client_id)
            }
        };
        deliver(&mut clients, out, &log);
    }

    sink_info!(
        log,
        "relay event channel closed; loop exiting ({} clients left)",
        clients.len()
    );
}

fn deliver(clients: &mut HashMap<ClientId, Sender<ConnCommand>>, out: Vec<Outgoing>, log: &Arc<dyn LogSink>) {
    for o in out {
        match o {
            Outgoing::Envelope { target, envelope } => {
                let Some(tx) = clients.get(&target) else {
                    sink_warn!(log, "no client {} to deliver '{}'", target, envelope.kind());
                    continue;
                };
                let text = match envelope.encode() {
                    Ok(t) => t,
                    Err(e) => {
                        sink_warn!(log, "could not encode '{}': {}", envelope.kind(), e);
                        continue;
                    }
                };
                if tx.send(ConnCommand::Send(text)).is_err() {
                    sink_warn!(log, "client {} connection thread is gone", target);
                }
            }
            Outgoing::Close { target } => {
                if let Some(tx) = clients.remove(&target) {
                    let _ = tx.send(ConnCommand::Close);
                }
            }
        }
    }
}
