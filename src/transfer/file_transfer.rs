use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

use bytes::Bytes;
use rand::Rng;

use crate::log::log_sink::LogSink;
use crate::mux::{BULK_CHANNEL, ChannelHost, ChannelMessage, MuxSender, Unregister};
use crate::transfer::{
    byte_source::{ByteSource, FileSource, mime_for},
    events::TransferEvent,
    messages::{FileInfo, FileRequest, TransferMessage},
    outgoing::{OutgoingQueue, PumpStatus},
    reassembler::Reassembler,
    transfer_config::TransferConfig,
    transfer_error::TransferError,
};
use crate::{sink_debug, sink_info, sink_warn};

/// Traffic the multiplexer handed to this layer, replayed in arrival order.
enum Inbound {
    Message(ChannelMessage),
    Data(Bytes),
}

/// File transfer business layer on the bulk channel.
///
/// Handlers registered on the session only forward into an inbox; all
/// protocol work happens in [`poll`](Self::poll), on the caller's thread.
pub struct FileTransfer {
    tx: MuxSender,
    inbox: Receiver<Inbound>,
    handlers: Vec<Unregister>,
    outgoing: OutgoingQueue,
    reassembler: Reassembler,
    last_pump: PumpStatus,
    log: Arc<dyn LogSink>,
}

impl FileTransfer {
    pub fn attach<H: ChannelHost>(host: &H, cfg: TransferConfig, log: Arc<dyn LogSink>) -> Self {
        let (in_tx, inbox) = mpsc::channel::<Inbound>();

        let msg_tx: Sender<Inbound> = in_tx.clone();
        let on_message = host.register_handler(BULK_CHANNEL, move |m: &ChannelMessage| {
            let _ = msg_tx.send(Inbound::Message(m.clone()));
        });
        let on_data = host.register_data_handler(BULK_CHANNEL, move |b: Bytes| {
            let _ = in_tx.send(Inbound::Data(b));
        });

        let chunk_size = u32::try_from(cfg.chunk_size).unwrap_or(u32::MAX);
        Self {
            tx: host.sender(),
            inbox,
            handlers: vec![on_message, on_data],
            outgoing: OutgoingQueue::new(cfg, log.clone()),
            reassembler: Reassembler::new(chunk_size, log.clone()),
            last_pump: PumpStatus::Idle,
            log,
        }
    }

    /// Queues an in-memory source. Returns the transfer id.
    pub fn send_bytes(&mut self, name: &str, mime_type: &str, data: Bytes) -> Result<String, TransferError> {
        self.enqueue(name, mime_type, Box::new(data))
    }

    /// Queues a file from disk; it is read chunk by chunk while sending.
    pub fn send_file(&mut self, path: impl AsRef<Path>) -> Result<String, TransferError> {
        let source = FileSource::open(path)?;
        let name = source.file_name();
        let mime = mime_for(&name);
        self.enqueue(&name, mime, Box::new(source))
    }

    fn enqueue(&mut self, name: &str, mime_type: &str, source: Box<dyn ByteSource>) -> Result<String, TransferError> {
        if !self.tx.is_ready() {
            sink_warn!(self.log, "cannot send '{}': channel not open", name);
            return Err(TransferError::NotConnected);
        }
        let id = new_transfer_id();
        self.outgoing
            .enqueue(id.clone(), name.to_string(), mime_type.to_string(), source);
        Ok(id)
    }

    /// Asks the peer to send one of the files it listed.
    pub fn request_file(&self, file_id: &str, file_name: &str) -> Result<(), TransferError> {
        let msg = TransferMessage::Request(FileRequest {
            file_id: file_id.to_string(),
            file_name: file_name.to_string(),
        });
        self.tx.try_send(&msg.to_channel_message()?)?;
        sink_info!(self.log, "requested '{}' ({})", file_name, file_id);
        Ok(())
    }

    pub fn send_file_list(&self, files: &[FileInfo]) -> Result<(), TransferError> {
        let msg = TransferMessage::FileList(files.to_vec());
        self.tx.try_send(&msg.to_channel_message()?)?;
        sink_debug!(self.log, "sent file list with {} entries", files.len());
        Ok(())
    }

    pub fn outgoing_len(&self) -> usize {
        self.outgoing.len()
    }

    pub fn incoming_len(&self) -> usize {
        self.reassembler.active_count()
    }

    /// True while the sender waits for the channel buffer to drain.
    pub fn is_backpressured(&self) -> bool {
        self.last_pump == PumpStatus::Paused
    }

    /// Processes received traffic, then pushes queued chunks.
    pub fn poll(&mut self) -> Vec<TransferEvent> {
        let mut events = Vec::new();
        while let Ok(item) = self.inbox.try_recv() {
            match item {
                Inbound::Message(m) => self.on_message(&m, &mut events),
                Inbound::Data(b) => events.extend(self.reassembler.on_binary(b)),
            }
        }
        self.last_pump = self.outgoing.pump(&self.tx, &mut events);
        events
    }

    /// Releases every transfer in either direction without further events.
    pub fn reset(&mut self) {
        self.outgoing.clear();
        self.reassembler.reset();
        while self.inbox.try_recv().is_ok() {}
        self.last_pump = PumpStatus::Idle;
    }

    fn on_message(&mut self, m: &ChannelMessage, events: &mut Vec<TransferEvent>) {
        let parsed = match TransferMessage::from_channel_message(m) {
            Ok(Some(p)) => p,
            Ok(None) => {
                sink_debug!(self.log, "ignoring '{}' on the transfer channel", m.kind);
                return;
            }
            Err(e) => {
                sink_warn!(self.log, "dropping malformed '{}': {}", m.kind, e);
                return;
            }
        };
        match parsed {
            TransferMessage::Metadata(meta) => events.extend(self.reassembler.on_metadata(meta)),
            TransferMessage::ChunkInfo(info) => self.reassembler.on_chunk_info(info),
            TransferMessage::Complete(done) => events.extend(self.reassembler.on_complete(done)),
            TransferMessage::FileList(files) => {
                sink_info!(self.log, "peer listed {} files", files.len());
                events.push(TransferEvent::FileListReceived(files));
            }
            TransferMessage::Request(req) => {
                sink_info!(self.log, "peer requested '{}' ({})", req.file_name, req.file_id);
                events.push(TransferEvent::FileRequested {
                    file_id: req.file_id,
                    file_name: req.file_name,
                });
            }
        }
    }
}

impl Drop for FileTransfer {
    fn drop(&mut self) {
        for h in self.handlers.drain(..) {
            let _ = h.unregister();
        }
    }
}

/// Unique enough per session: millisecond clock plus 32 random bits.
fn new_transfer_id() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..u32::MAX);
    format!("file_{}_{suffix:08x}", crate::log::log_msg::now_millis())
}
