use std::io;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::Duration;

use tungstenite::Message;
use tungstenite::stream::MaybeTlsStream;

use crate::log::log_sink::LogSink;
use crate::signaling::{
    connect_params::ConnectParams,
    envelope::SignalEnvelope,
    signaling_config::SignalingConfig,
    signaling_error::SignalingError,
    transport::{SignalingConnector, SignalingTransport, TransportEvent},
};
use crate::{sink_debug, sink_info, sink_warn};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

enum WsCommand {
    Send(String),
    Close,
}

/// Opens WebSocket signaling connections to `base_url`, one worker thread per
/// connection.
pub struct WsConnector {
    base_url: String,
    log: Arc<dyn LogSink>,
    poll_interval: Duration,
}

impl WsConnector {
    pub fn new(base_url: impl Into<String>, log: Arc<dyn LogSink>) -> Self {
        Self {
            base_url: base_url.into(),
            log,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn from_config(cfg: &SignalingConfig, log: Arc<dyn LogSink>) -> Self {
        Self::new(cfg.url.clone(), log)
    }

    /// How long the worker blocks in a socket read before servicing sends.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }
}

impl SignalingConnector for WsConnector {
    fn open(&self, params: &ConnectParams) -> Result<Box<dyn SignalingTransport>, SignalingError> {
        let url = params.url_for(&self.base_url);
        let (cmd_tx, cmd_rx) = mpsc::channel::<WsCommand>();
        let (ev_tx, ev_rx) = mpsc::channel::<TransportEvent>();
        let log = self.log.clone();
        let poll = self.poll_interval;

        sink_info!(self.log, "opening signaling connection to {}", url);

        thread::Builder::new()
            .name("signaling-ws".into())
            .spawn(move || run_worker(&url, &cmd_rx, &ev_tx, &log, poll))
            .map_err(|e| SignalingError::Connect(e.to_string()))?;

        Ok(Box::new(WsTransport {
            cmd_tx,
            ev_rx,
            finished: false,
        }))
    }
}

/// Owner side of one WebSocket signaling connection.
pub struct WsTransport {
    cmd_tx: Sender<WsCommand>,
    ev_rx: Receiver<TransportEvent>,
    finished: bool,
}

impl SignalingTransport for WsTransport {
    fn send(&mut self, envelope: &SignalEnvelope) -> Result<(), SignalingError> {
        if self.finished {
            return Err(SignalingError::Closed);
        }
        let text = envelope.encode()?;
        self.cmd_tx
            .send(WsCommand::Send(text))
            .map_err(|_| SignalingError::Closed)
    }

    fn try_recv(&mut self) -> Option<TransportEvent> {
        if self.finished {
            return None;
        }
        match self.ev_rx.try_recv() {
            Ok(ev) => {
                if matches!(ev, TransportEvent::Closed(_) | TransportEvent::Error(_)) {
                    self.finished = true;
                }
                Some(ev)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.finished = true;
                Some(TransportEvent::Closed("signaling worker exited".into()))
            }
        }
    }

    fn close(&mut self) {
        if !self.finished {
            let _ = self.cmd_tx.send(WsCommand::Close);
            self.finished = true;
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_worker(
    url: &str,
    cmd_rx: &Receiver<WsCommand>,
    ev_tx: &Sender<TransportEvent>,
    log: &Arc<dyn LogSink>,
    poll: Duration,
) {
    let mut ws = match tungstenite::connect(url) {
        Ok((ws, _response)) => ws,
        Err(e) => {
            sink_warn!(log, "signaling connect to {} failed: {}", url, e);
            let _ = ev_tx.send(TransportEvent::Error(format!("connect failed: {e}")));
            return;
        }
    };

    // Bounded reads let this thread interleave outbound envelopes.
    if let MaybeTlsStream::Plain(tcp) = ws.get_ref() {
        if let Err(e) = tcp.set_read_timeout(Some(poll)) {
            sink_warn!(log, "could not set signaling read timeout: {}", e);
        }
    }

    if ev_tx.send(TransportEvent::Opened).is_err() {
        let _ = ws.close(None);
        return;
    }

    loop {
        loop {
            match cmd_rx.try_recv() {
                Ok(WsCommand::Send(text)) => {
                    if let Err(e) = ws.send(Message::text(text)) {
                        let _ = ev_tx.send(TransportEvent::Error(format!("send failed: {e}")));
                        return;
                    }
                }
                Ok(WsCommand::Close) | Err(TryRecvError::Disconnected) => {
                    sink_debug!(log, "closing signaling connection");
                    let _ = ws.close(None);
                    let _ = ws.flush();
                    return;
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        let event = match ws.read() {
            Ok(Message::Text(text)) => match SignalEnvelope::decode(&text) {
                Ok(env) => TransportEvent::Envelope(env),
                Err(e) => {
                    sink_warn!(log, "ignoring signaling frame: {}", e);
                    continue;
                }
            },
            Ok(Message::Close(frame)) => {
                let reason = frame
                    .map(|f| f.reason.to_string())
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| "closed by rendezvous".into());
                let _ = ev_tx.send(TransportEvent::Closed(reason));
                return;
            }
            Ok(_) => continue,
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                let _ = ev_tx.send(TransportEvent::Closed("connection closed".into()));
                return;
            }
            Err(e) => {
                let _ = ev_tx.send(TransportEvent::Error(e.to_string()));
                return;
            }
        };

        if ev_tx.send(event).is_err() {
            let _ = ws.close(None);
            return;
        }
    }
}
