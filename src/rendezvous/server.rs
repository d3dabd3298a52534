use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::{Message, WebSocket};

use crate::config::Config;
use crate::log::log_sink::LogSink;
use crate::rendezvous::{
    relay_loop::run_relay_loop,
    rooms::{ClientId, Rooms},
    server_event::{ConnCommand, ServerEvent},
};
use crate::signaling::{ConnectParams, SignalEnvelope};
use crate::{sink_debug, sink_info, sink_warn};

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
const READ_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendezvousConfig {
    pub listen: String,
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
        }
    }
}

impl RendezvousConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            listen: cfg
                .get_non_empty_or_default("rendezvous", "listen", DEFAULT_LISTEN)
                .to_string(),
        }
    }
}

/// WebSocket rendezvous relay.
///
/// Clients connect to any path with `?code=..&role=..[&channel=..]`. One
/// central thread owns the rooms; each connection gets a thread that reads
/// frames and writes what the central thread routes to it.
pub struct RendezvousServer {
    listener: TcpListener,
    log: Arc<dyn LogSink>,
}

impl RendezvousServer {
    pub fn bind(addr: &str, log: Arc<dyn LogSink>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        Ok(Self { listener, log })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Blocking accept loop.
    pub fn run(self) -> io::Result<()> {
        let Self { listener, log } = self;
        let (server_tx, server_rx) = mpsc::channel::<ServerEvent>();

        {
            let log_for_loop = log.clone();
            let rooms = Rooms::new(log.clone());
            thread::Builder::new()
                .name("rendezvous-relay".into())
                .spawn(move || run_relay_loop(rooms, log_for_loop, server_rx))?;
        }

        sink_info!(log, "rendezvous listening on {}", listener.local_addr()?);
        let mut next_client_id: ClientId = 1;

        for stream in listener.incoming() {
            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    sink_warn!(log, "accept failed: {} (continuing)", e);
                    continue;
                }
            };
            let client_id = next_client_id;
            next_client_id += 1;

            let server_tx = server_tx.clone();
            let log_for_conn = log.clone();
            let spawned = thread::Builder::new()
                .name(format!("rendezvous-conn-{client_id}"))
                .spawn(move || serve_connection(client_id, stream, &server_tx, &log_for_conn));
            if let Err(e) = spawned {
                sink_warn!(log, "could not spawn thread for client {}: {}", client_id, e);
            }
        }
        Ok(())
    }

    /// Runs the accept loop on a background thread.
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        let log = self.log.clone();
        thread::Builder::new()
            .name("rendezvous-accept".into())
            .spawn(move || {
                if let Err(e) = self.run() {
                    sink_warn!(log, "rendezvous stopped: {}", e);
                }
            })
    }
}

fn serve_connection(client_id: ClientId, stream: TcpStream, server_tx: &Sender<ServerEvent>, log: &Arc<dyn LogSink>) {
    let mut query = String::new();
    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        query = req.uri().query().unwrap_or_default().to_string();
        Ok(resp)
    };
    let mut ws = match tungstenite::accept_hdr(stream, callback) {
        Ok(ws) => ws,
        Err(e) => {
            sink_warn!(log, "client {} handshake failed: {}", client_id, e);
            return;
        }
    };

    let params = match ConnectParams::from_query(&query) {
        Ok(p) => p,
        Err(e) => {
            sink_warn!(log, "client {} refused: {}", client_id, e);
            if let Ok(text) = SignalEnvelope::error(e.to_string()).encode() {
                let _ = ws.send(Message::text(text));
            }
            let _ = ws.close(None);
            let _ = ws.flush();
            return;
        }
    };
    if let Err(e) = ws.get_ref().set_read_timeout(Some(READ_POLL)) {
        sink_warn!(log, "client {}: could not set read timeout: {}", client_id, e);
    }

    let (to_client, commands) = mpsc::channel::<ConnCommand>();
    sink_info!(log, "client {} connected for room {} as {}", client_id, params.code, params.role);
    if server_tx
        .send(ServerEvent::Register {
            client_id,
            params,
            to_client,
        })
        .is_err()
    {
        return;
    }

    pump_connection(client_id, &mut ws, &commands, server_tx, log);
    let _ = server_tx.send(ServerEvent::Disconnected { client_id });
}

fn pump_connection(
    client_id: ClientId,
    ws: &mut WebSocket<TcpStream>,
    commands: &Receiver<ConnCommand>,
    server_tx: &Sender<ServerEvent>,
    log: &Arc<dyn LogSink>,
) {
    loop {
        loop {
            match commands.try_recv() {
                Ok(ConnCommand::Send(text)) => {
                    if let Err(e) = ws.send(Message::text(text)) {
                        sink_warn!(log, "client {}: send failed: {}", client_id, e);
                        return;
                    }
                }
                Ok(ConnCommand::Close) | Err(TryRecvError::Disconnected) => {
                    sink_debug!(log, "closing client {}", client_id);
                    let _ = ws.close(None);
                    let _ = ws.flush();
                    return;
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        match ws.read() {
            Ok(Message::Text(text)) => match SignalEnvelope::decode(&text) {
                Ok(envelope) => {
                    let ev = ServerEvent::Envelope {
                        client_id,
                        envelope,
                    };
                    if server_tx.send(ev).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    sink_warn!(log, "client {}: {}", client_id, e);
                    if let Ok(reply) = SignalEnvelope::error(e.to_string()).encode() {
                        let _ = ws.send(Message::text(reply));
                    }
                }
            },
            Ok(Message::Close(_)) => {
                sink_debug!(log, "client {} closed the connection", client_id);
                let _ = ws.flush();
                return;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => {}
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => return,
            Err(e) => {
                sink_warn!(log, "client {}: read failed: {}", client_id, e);
                return;
            }
        }
    }
}
