use std::collections::VecDeque;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::log::log_sink::LogSink;
use crate::mux::{MuxError, MuxSender};
use crate::transfer::{
    byte_source::ByteSource,
    events::{Direction, TransferEvent},
    messages::{ChunkInfo, FileComplete, FileMetadata, TransferMessage},
    reassembler::hex_lower,
    transfer_config::{MAX_CHUNKS_PER_POLL, TransferConfig},
    transfer_session::{TransferSession, TransferState},
};
use crate::{sink_debug, sink_info, sink_warn, transfer_trace};

/// Rough size of an encoded chunk-info frame, counted against the
/// high-water mark together with the chunk itself.
const CHUNK_INFO_OVERHEAD: usize = 128;

struct Outgoing {
    session: TransferSession,
    source: Box<dyn ByteSource>,
    next_chunk: u32,
    hasher: Sha256,
}

/// Why a pump turn stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpStatus {
    Idle,
    /// Waiting for the channel to drain below the low-water mark.
    Paused,
    /// Per-turn chunk budget used up; more to send next turn.
    Yielded,
    /// The channel is not open; nothing was sent.
    Blocked,
}

/// FIFO of outgoing transfers. Only the head transfer sends, and each
/// chunk-info goes out immediately followed by its frame, so the receiver
/// never sees two descriptions in flight.
pub struct OutgoingQueue {
    cfg: TransferConfig,
    queue: VecDeque<Outgoing>,
    paused: bool,
    log: Arc<dyn LogSink>,
}

impl OutgoingQueue {
    pub fn new(cfg: TransferConfig, log: Arc<dyn LogSink>) -> Self {
        Self {
            cfg,
            queue: VecDeque::new(),
            paused: false,
            log,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn enqueue(&mut self, id: String, name: String, mime_type: String, source: Box<dyn ByteSource>) {
        let chunk_size = u32::try_from(self.cfg.chunk_size).unwrap_or(u32::MAX);
        let session = TransferSession::new(id, name, source.len(), mime_type, chunk_size);
        sink_info!(
            self.log,
            "queued '{}' ({} bytes, {} chunks) as {}",
            session.name,
            session.total_size,
            session.total_chunks,
            session.id
        );
        self.queue.push_back(Outgoing {
            session,
            source,
            next_chunk: 0,
            hasher: Sha256::new(),
        });
    }

    /// Forgets every queued transfer without emitting anything.
    pub fn clear(&mut self) {
        if !self.queue.is_empty() {
            sink_info!(self.log, "discarding {} unfinished outgoing transfers", self.queue.len());
        }
        self.queue.clear();
        self.paused = false;
    }

    /// Sends as much as backpressure and the per-turn budget allow.
    pub fn pump(&mut self, tx: &MuxSender, events: &mut Vec<TransferEvent>) -> PumpStatus {
        let mut budget = MAX_CHUNKS_PER_POLL;
        loop {
            let Some(head) = self.queue.front_mut() else {
                return PumpStatus::Idle;
            };
            if !tx.is_ready() {
                return PumpStatus::Blocked;
            }

            if head.session.state == TransferState::Pending {
                let meta = TransferMessage::Metadata(FileMetadata {
                    id: head.session.id.clone(),
                    name: head.session.name.clone(),
                    size: head.session.total_size,
                    mime_type: head.session.mime_type.clone(),
                    chunk_size: Some(head.session.chunk_size),
                });
                if let Err(e) = send_control(tx, &meta) {
                    self.abort_head(e.to_string(), events);
                    continue;
                }
                head.session.state = TransferState::InProgress;
            }

            if head.next_chunk < head.session.total_chunks {
                if budget == 0 {
                    return PumpStatus::Yielded;
                }
                let (start, end) = head.session.chunk_range(head.next_chunk);
                if !self.may_send(tx.buffered_amount(), (end - start) as usize) {
                    return PumpStatus::Paused;
                }
                budget -= 1;
                if let Err(reason) = self.send_next_chunk(tx, events) {
                    self.abort_head(reason, events);
                }
                continue;
            }

            self.finish_head(tx, events);
        }
    }

    /// Backpressure gate. Once paused, stay paused until the channel drains
    /// to the low-water mark; otherwise pause when this chunk would push the
    /// buffer past the high-water mark. An empty buffer always admits one
    /// chunk so oversized chunks still make progress.
    fn may_send(&mut self, buffered: usize, chunk_len: usize) -> bool {
        if self.paused {
            if buffered > self.cfg.low_water_mark {
                return false;
            }
            sink_debug!(self.log, "send buffer drained to {} bytes; resuming", buffered);
            self.paused = false;
        }
        let after = buffered + chunk_len + CHUNK_INFO_OVERHEAD;
        if buffered > 0 && after > self.cfg.high_water_mark {
            sink_debug!(
                self.log,
                "send buffer at {} bytes; pausing until {}",
                buffered,
                self.cfg.low_water_mark
            );
            self.paused = true;
            return false;
        }
        true
    }

    fn send_next_chunk(&mut self, tx: &MuxSender, events: &mut Vec<TransferEvent>) -> Result<(), String> {
        let Some(head) = self.queue.front_mut() else {
            return Ok(());
        };
        let index = head.next_chunk;
        let (start, end) = head.session.chunk_range(index);
        let data = head
            .source
            .read_range(start, end)
            .map_err(|e| format!("reading chunk {index}: {e}"))?;

        let info = TransferMessage::ChunkInfo(ChunkInfo {
            transfer_id: head.session.id.clone(),
            chunk_index: index,
            total_chunks: head.session.total_chunks,
        });
        send_control(tx, &info).map_err(|e| e.to_string())?;
        head.hasher.update(&data);
        tx.try_send_data(data).map_err(|e| e.to_string())?;

        transfer_trace!(self.log, "sent chunk {} of '{}'", index, head.session.id);
        head.session.mark_done(index);
        head.next_chunk += 1;
        events.push(TransferEvent::Progress {
            id: head.session.id.clone(),
            direction: Direction::Send,
            percent: head.session.progress(),
        });
        Ok(())
    }

    fn finish_head(&mut self, tx: &MuxSender, events: &mut Vec<TransferEvent>) {
        let Some(mut head) = self.queue.pop_front() else {
            return;
        };
        let digest = hex_lower(&std::mem::take(&mut head.hasher).finalize());
        let done = TransferMessage::Complete(FileComplete {
            transfer_id: head.session.id.clone(),
            sha256: Some(digest),
        });
        if let Err(e) = send_control(tx, &done) {
            sink_warn!(self.log, "could not complete '{}': {}", head.session.id, e);
            events.push(TransferEvent::Failed {
                id: head.session.id,
                direction: Direction::Send,
                reason: e.to_string(),
            });
            return;
        }

        head.session.state = TransferState::Complete;
        if head.session.total_chunks == 0 {
            events.push(TransferEvent::Progress {
                id: head.session.id.clone(),
                direction: Direction::Send,
                percent: 100.0,
            });
        }
        sink_info!(self.log, "sent '{}' as {}", head.session.name, head.session.id);
        events.push(TransferEvent::Sent { id: head.session.id });
    }

    fn abort_head(&mut self, reason: String, events: &mut Vec<TransferEvent>) {
        if let Some(mut head) = self.queue.pop_front() {
            head.session.state = TransferState::Aborted;
            sink_warn!(self.log, "aborting outgoing '{}': {}", head.session.id, reason);
            events.push(TransferEvent::Failed {
                id: head.session.id,
                direction: Direction::Send,
                reason,
            });
        }
    }
}

fn send_control(tx: &MuxSender, msg: &TransferMessage) -> Result<(), MuxError> {
    let cm = msg
        .to_channel_message()
        .map_err(|e| MuxError::Encode(e.to_string()))?;
    tx.try_send(&cm)
}
