use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use sha2::{Digest, Sha256};

use crate::log::log_sink::LogSink;
use crate::transfer::{
    events::{Direction, ReceivedFile, TransferEvent},
    messages::{ChunkInfo, FileComplete, FileMetadata},
    transfer_session::{TransferSession, TransferState, percent},
};
use crate::{sink_debug, sink_info, sink_warn, transfer_trace};

/// How many finished transfer ids are remembered to recognise late traffic.
const FINISHED_MEMORY: usize = 64;

/// What the next binary frame belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Pending {
    Chunk { id: String, index: u32 },
    /// The frame pairs with a chunk-info that was rejected; swallow it quietly.
    Discard,
}

struct Incoming {
    session: TransferSession,
    /// True when the sender declared its chunk size, so frame lengths can be
    /// checked against the geometry.
    geometry_known: bool,
    chunks: BTreeMap<u32, Bytes>,
    received: u64,
}

/// Receive side of the chunked transfer protocol.
///
/// At most one chunk-info is pending at a time; a binary frame is accepted
/// only while one is. Chunks are stored by index and concatenated in index
/// order on `file-complete`.
pub struct Reassembler {
    default_chunk_size: u32,
    active: HashMap<String, Incoming>,
    finished: VecDeque<String>,
    pending: Option<Pending>,
    log: Arc<dyn LogSink>,
}

impl Reassembler {
    pub fn new(default_chunk_size: u32, log: Arc<dyn LogSink>) -> Self {
        Self {
            default_chunk_size: default_chunk_size.max(1),
            active: HashMap::new(),
            finished: VecDeque::new(),
            pending: None,
            log,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.active.contains_key(id)
    }

    /// Drops every in-flight transfer without emitting anything.
    pub fn reset(&mut self) {
        if !self.active.is_empty() {
            sink_info!(self.log, "discarding {} incomplete incoming transfers", self.active.len());
        }
        self.active.clear();
        self.finished.clear();
        self.pending = None;
    }

    fn is_finished(&self, id: &str) -> bool {
        self.finished.iter().any(|f| f == id)
    }

    fn remember_finished(&mut self, id: String) {
        if self.finished.len() == FINISHED_MEMORY {
            self.finished.pop_front();
        }
        self.finished.push_back(id);
    }

    /// The sender streams one transfer at a time, so a new announcement
    /// means any other unfinished transfer will never complete.
    pub fn on_metadata(&mut self, meta: FileMetadata) -> Vec<TransferEvent> {
        let mut events = Vec::new();
        if self.active.contains_key(&meta.id) {
            sink_warn!(self.log, "transfer '{}' announced twice; restarting it", meta.id);
        }
        let stale: Vec<String> = self
            .active
            .keys()
            .filter(|id| **id != meta.id)
            .cloned()
            .collect();
        for id in stale {
            self.active.remove(&id);
            sink_warn!(self.log, "transfer '{}' abandoned by sender; dropping it", id);
            events.push(TransferEvent::Failed {
                id: id.clone(),
                direction: Direction::Receive,
                reason: format!("superseded by '{}'", meta.id),
            });
            self.remember_finished(id);
        }
        if matches!(&self.pending, Some(Pending::Chunk { id, .. }) if *id != meta.id) {
            self.pending = None;
        }
        self.finished.retain(|f| *f != meta.id);

        let geometry_known = meta.chunk_size.is_some();
        let chunk_size = meta.chunk_size.unwrap_or(self.default_chunk_size);
        let mut session = TransferSession::new(
            meta.id.clone(),
            meta.name.clone(),
            meta.size,
            meta.mime_type.clone(),
            chunk_size,
        );
        session.state = TransferState::InProgress;
        sink_info!(
            self.log,
            "receiving '{}' ({} bytes, {} chunks) as {}",
            meta.name,
            meta.size,
            session.total_chunks,
            meta.id
        );

        self.active.insert(
            meta.id.clone(),
            Incoming {
                session,
                geometry_known,
                chunks: BTreeMap::new(),
                received: 0,
            },
        );
        events.push(TransferEvent::Incoming(meta));
        events
    }

    pub fn on_chunk_info(&mut self, info: ChunkInfo) {
        if let Some(stale) = self.pending.take() {
            sink_warn!(
                self.log,
                "chunk-info {:?} never got its binary frame; keeping the newer one",
                stale
            );
        }

        let Some(inc) = self.active.get_mut(&info.transfer_id) else {
            if self.is_finished(&info.transfer_id) {
                sink_debug!(self.log, "chunk-info for finished transfer '{}' dropped", info.transfer_id);
            } else {
                sink_warn!(self.log, "chunk-info for unknown transfer '{}' dropped", info.transfer_id);
            }
            self.pending = Some(Pending::Discard);
            return;
        };

        // Senders without a declared chunk size are trusted on the count.
        if info.total_chunks != inc.session.total_chunks {
            if !inc.geometry_known && inc.chunks.is_empty() {
                sink_debug!(
                    self.log,
                    "adopting sender chunk count {} for '{}'",
                    info.total_chunks,
                    info.transfer_id
                );
                inc.session.total_chunks = info.total_chunks;
            } else {
                sink_warn!(
                    self.log,
                    "chunk-info for '{}' claims {} chunks, expected {}; ignored field",
                    info.transfer_id,
                    info.total_chunks,
                    inc.session.total_chunks
                );
            }
        }

        if info.chunk_index >= inc.session.total_chunks {
            sink_warn!(
                self.log,
                "chunk index {} out of range for '{}' ({} chunks)",
                info.chunk_index,
                info.transfer_id,
                inc.session.total_chunks
            );
            self.pending = Some(Pending::Discard);
            return;
        }

        self.pending = Some(Pending::Chunk {
            id: info.transfer_id,
            index: info.chunk_index,
        });
    }

    pub fn on_binary(&mut self, data: Bytes) -> Vec<TransferEvent> {
        let (id, index) = match self.pending.take() {
            Some(Pending::Chunk { id, index }) => (id, index),
            Some(Pending::Discard) => {
                sink_debug!(self.log, "dropping {} byte frame of a rejected chunk", data.len());
                return Vec::new();
            }
            None => {
                sink_warn!(
                    self.log,
                    "dropping {} byte binary frame with no pending chunk-info",
                    data.len()
                );
                return Vec::new();
            }
        };

        let Some(inc) = self.active.get_mut(&id) else {
            sink_debug!(self.log, "transfer '{}' went away before its chunk arrived", id);
            return Vec::new();
        };

        if inc.session.is_done(index) {
            sink_warn!(self.log, "duplicate chunk {} for '{}' dropped", index, id);
            return Vec::new();
        }

        if inc.geometry_known {
            let (start, end) = inc.session.chunk_range(index);
            let expected = end - start;
            if data.len() as u64 != expected {
                sink_warn!(
                    self.log,
                    "chunk {} of '{}' is {} bytes, expected {}; dropped",
                    index,
                    id,
                    data.len(),
                    expected
                );
                return Vec::new();
            }
        } else if inc.received + data.len() as u64 > inc.session.total_size {
            sink_warn!(
                self.log,
                "chunk {} of '{}' would exceed the announced {} bytes; dropped",
                index,
                id,
                inc.session.total_size
            );
            return Vec::new();
        }

        transfer_trace!(self.log, "chunk {} of '{}' ({} bytes)", index, id, data.len());
        inc.session.mark_done(index);
        inc.received += data.len() as u64;
        inc.chunks.insert(index, data);
        vec![TransferEvent::Progress {
            id,
            direction: Direction::Receive,
            percent: percent(inc.session.done_count(), inc.session.total_chunks),
        }]
    }

    pub fn on_complete(&mut self, done: FileComplete) -> Vec<TransferEvent> {
        let id = done.transfer_id;
        if self.is_finished(&id) {
            sink_debug!(self.log, "duplicate file-complete for '{}' ignored", id);
            return Vec::new();
        }
        let Some(inc) = self.active.remove(&id) else {
            sink_warn!(self.log, "file-complete for unknown transfer '{}' dropped", id);
            return Vec::new();
        };
        self.remember_finished(id.clone());
        if matches!(&self.pending, Some(Pending::Chunk { id: p, .. }) if *p == id) {
            self.pending = None;
        }

        match assemble(inc, done.sha256.as_deref()) {
            Ok(file) => {
                sink_info!(
                    self.log,
                    "received '{}' ({} bytes) as {}",
                    file.name,
                    file.data.len(),
                    file.id
                );
                let mut out = Vec::with_capacity(2);
                if file.data.is_empty() {
                    out.push(TransferEvent::Progress {
                        id: id.clone(),
                        direction: Direction::Receive,
                        percent: 100.0,
                    });
                }
                out.push(TransferEvent::Completed(file));
                out
            }
            Err(reason) => {
                sink_warn!(self.log, "transfer '{}' failed: {}", id, reason);
                vec![TransferEvent::Failed {
                    id,
                    direction: Direction::Receive,
                    reason,
                }]
            }
        }
    }
}

fn assemble(inc: Incoming, sha256: Option<&str>) -> Result<ReceivedFile, String> {
    let mut session = inc.session;
    if let Some(missing) = session.first_missing() {
        session.state = TransferState::Aborted;
        return Err(format!(
            "chunk {missing} of {} never arrived",
            session.total_chunks
        ));
    }

    // Checked before allocating: the announced size comes from the peer.
    let received: u64 = inc.chunks.values().map(|c| c.len() as u64).sum();
    if received != session.total_size {
        session.state = TransferState::Aborted;
        return Err(format!(
            "received {received} bytes, announced {}",
            session.total_size
        ));
    }

    let mut buf = BytesMut::with_capacity(usize::try_from(received).unwrap_or(0));
    for chunk in inc.chunks.values() {
        buf.extend_from_slice(chunk);
    }

    if let Some(expected) = sha256 {
        let actual = sha256_hex(&buf);
        if !actual.eq_ignore_ascii_case(expected) {
            session.state = TransferState::Aborted;
            return Err(format!("sha256 mismatch: got {actual}, expected {expected}"));
        }
    }

    session.state = TransferState::Complete;
    Ok(ReceivedFile {
        id: session.id,
        name: session.name,
        mime_type: session.mime_type,
        data: buf.freeze(),
    })
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex_lower(&Sha256::digest(data))
}

pub(crate) fn hex_lower(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::{LogLevel, MemoryLogSink};

    fn rig() -> (Reassembler, Arc<MemoryLogSink>) {
        let log = Arc::new(MemoryLogSink::new());
        (Reassembler::new(4, log.clone()), log)
    }

    fn meta(id: &str, size: u64) -> FileMetadata {
        FileMetadata {
            id: id.into(),
            name: format!("{id}.bin"),
            size,
            mime_type: "application/octet-stream".into(),
            chunk_size: Some(4),
        }
    }

    fn info(id: &str, index: u32, total: u32) -> ChunkInfo {
        ChunkInfo {
            transfer_id: id.into(),
            chunk_index: index,
            total_chunks: total,
        }
    }

    fn complete(id: &str) -> FileComplete {
        FileComplete {
            transfer_id: id.into(),
            sha256: None,
        }
    }

    fn progress(events: &[TransferEvent]) -> Vec<f64> {
        events
            .iter()
            .filter_map(|e| match e {
                TransferEvent::Progress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect()
    }

    fn completed(events: &[TransferEvent]) -> Option<ReceivedFile> {
        events.iter().find_map(|e| match e {
            TransferEvent::Completed(f) => Some(f.clone()),
            _ => None,
        })
    }

    #[test]
    fn reassembles_in_index_order_with_progress() {
        let (mut r, _) = rig();
        let mut events = r.on_metadata(meta("t", 10));
        for (i, part) in [&b"ABCD"[..], b"EFGH", b"IJ"].iter().enumerate() {
            r.on_chunk_info(info("t", i as u32, 3));
            events.extend(r.on_binary(Bytes::copy_from_slice(part)));
        }
        events.extend(r.on_complete(FileComplete {
            transfer_id: "t".into(),
            sha256: Some(sha256_hex(b"ABCDEFGHIJ")),
        }));

        assert_eq!(progress(&events), vec![33.3, 66.7, 100.0]);
        assert_eq!(&completed(&events).unwrap().data[..], b"ABCDEFGHIJ");
        assert_eq!(r.active_count(), 0);
    }

    #[test]
    fn chunks_arriving_out_of_index_order_are_placed_by_index() {
        let (mut r, _) = rig();
        r.on_metadata(meta("t", 10));
        for (i, part) in [(2u32, &b"IJ"[..]), (0, b"ABCD"), (1, b"EFGH")] {
            r.on_chunk_info(info("t", i, 3));
            r.on_binary(Bytes::copy_from_slice(part));
        }
        let events = r.on_complete(complete("t"));
        assert_eq!(&completed(&events).unwrap().data[..], b"ABCDEFGHIJ");
    }

    #[test]
    fn second_chunk_info_without_frame_replaces_the_first() {
        let (mut r, log) = rig();
        r.on_metadata(meta("t", 8));
        r.on_chunk_info(info("t", 0, 2));
        r.on_chunk_info(info("t", 1, 2));
        let events = r.on_binary(Bytes::from_static(b"EFGH"));

        assert_eq!(progress(&events), vec![50.0]);
        assert!(log.contains(LogLevel::Warn, "never got its binary frame"));

        // Chunk 0 was never delivered, so completion reports the gap.
        let events = r.on_complete(complete("t"));
        assert!(matches!(
            events.as_slice(),
            [TransferEvent::Failed { reason, .. }] if reason.contains("chunk 0")
        ));
    }

    #[test]
    fn unattributed_binary_is_dropped_with_warning() {
        let (mut r, log) = rig();
        r.on_metadata(meta("t", 4));
        assert!(r.on_binary(Bytes::from_static(b"ABCD")).is_empty());
        assert!(log.contains(LogLevel::Warn, "no pending chunk-info"));
    }

    #[test]
    fn out_of_range_and_duplicate_chunks_are_dropped() {
        let (mut r, log) = rig();
        r.on_metadata(meta("t", 8));
        r.on_chunk_info(info("t", 5, 2));
        assert!(r.on_binary(Bytes::from_static(b"XXXX")).is_empty());
        assert!(log.contains(LogLevel::Warn, "out of range"));

        r.on_chunk_info(info("t", 0, 2));
        assert_eq!(progress(&r.on_binary(Bytes::from_static(b"ABCD"))), vec![50.0]);
        r.on_chunk_info(info("t", 0, 2));
        assert!(r.on_binary(Bytes::from_static(b"ZZZZ")).is_empty());
        assert!(log.contains(LogLevel::Warn, "duplicate chunk 0"));

        r.on_chunk_info(info("t", 1, 2));
        r.on_binary(Bytes::from_static(b"EFGH"));
        let events = r.on_complete(complete("t"));
        assert_eq!(&completed(&events).unwrap().data[..], b"ABCDEFGH");
    }

    #[test]
    fn finished_transfers_ignore_late_traffic_and_duplicate_complete() {
        let (mut r, _) = rig();
        r.on_metadata(meta("t", 4));
        r.on_chunk_info(info("t", 0, 1));
        r.on_binary(Bytes::from_static(b"ABCD"));
        assert!(completed(&r.on_complete(complete("t"))).is_some());

        assert!(r.on_complete(complete("t")).is_empty());
        r.on_chunk_info(info("t", 0, 1));
        assert!(r.on_binary(Bytes::from_static(b"ABCD")).is_empty());
    }

    #[test]
    fn zero_byte_transfer_completes_at_one_hundred() {
        let (mut r, _) = rig();
        r.on_metadata(meta("empty", 0));
        let events = r.on_complete(complete("empty"));
        assert_eq!(progress(&events), vec![100.0]);
        assert!(completed(&events).unwrap().data.is_empty());
    }

    #[test]
    fn digest_mismatch_fails_the_transfer() {
        let (mut r, _) = rig();
        r.on_metadata(meta("t", 4));
        r.on_chunk_info(info("t", 0, 1));
        r.on_binary(Bytes::from_static(b"ABCD"));
        let events = r.on_complete(FileComplete {
            transfer_id: "t".into(),
            sha256: Some(sha256_hex(b"ABCE")),
        });
        assert!(matches!(
            events.as_slice(),
            [TransferEvent::Failed { reason, .. }] if reason.contains("sha256 mismatch")
        ));
    }

    #[test]
    fn legacy_senders_without_chunk_size_are_trusted_on_count() {
        let (mut r, _) = rig();
        let mut m = meta("t", 10);
        m.chunk_size = None;
        r.on_metadata(m);
        r.on_chunk_info(info("t", 0, 2));
        r.on_binary(Bytes::from_static(b"ABCDEF"));
        r.on_chunk_info(info("t", 1, 2));
        r.on_binary(Bytes::from_static(b"GHIJ"));
        let events = r.on_complete(complete("t"));
        assert_eq!(&completed(&events).unwrap().data[..], b"ABCDEFGHIJ");
    }

    #[test]
    fn oversized_legacy_announcement_fails_without_allocating_it() {
        let (mut r, log) = rig();
        let mut m = meta("huge", 1 << 62);
        m.chunk_size = None;
        r.on_metadata(m);
        r.on_chunk_info(info("huge", 0, 1));
        assert_eq!(progress(&r.on_binary(Bytes::from_static(b"AB"))), vec![100.0]);

        let events = r.on_complete(complete("huge"));
        assert!(matches!(
            events.as_slice(),
            [TransferEvent::Failed { reason, .. }] if reason.contains("received 2 bytes")
        ));
        assert!(log.contains(LogLevel::Warn, "failed"));
        assert_eq!(r.active_count(), 0);
    }

    #[test]
    fn legacy_frames_past_the_announced_size_are_dropped() {
        let (mut r, log) = rig();
        let mut m = meta("t", 4);
        m.chunk_size = None;
        r.on_metadata(m);
        r.on_chunk_info(info("t", 0, 2));
        r.on_binary(Bytes::from_static(b"ABC"));
        r.on_chunk_info(info("t", 1, 2));
        assert!(r.on_binary(Bytes::from_static(b"DEFG")).is_empty());
        assert!(log.contains(LogLevel::Warn, "would exceed the announced 4 bytes"));
    }

    #[test]
    fn new_announcement_drops_an_abandoned_transfer() {
        let (mut r, _) = rig();
        r.on_metadata(meta("old", 8));
        r.on_chunk_info(info("old", 0, 2));
        r.on_binary(Bytes::from_static(b"ABCD"));

        let events = r.on_metadata(meta("new", 4));
        assert!(matches!(
            events.as_slice(),
            [TransferEvent::Failed { id, reason, .. }, TransferEvent::Incoming(m)]
                if id == "old" && reason.contains("superseded") && m.id == "new"
        ));
        assert!(!r.is_active("old"));
        assert!(r.is_active("new"));

        // Late traffic for the dropped transfer is ignored.
        r.on_chunk_info(info("old", 1, 2));
        assert!(r.on_binary(Bytes::from_static(b"EFGH")).is_empty());
        assert!(r.on_complete(complete("old")).is_empty());
    }

    #[test]
    fn finished_ids_are_remembered_up_to_a_bound() {
        let (mut r, _) = rig();
        for i in 0..FINISHED_MEMORY + 10 {
            let id = format!("t{i}");
            r.on_metadata(meta(&id, 0));
            r.on_complete(complete(&id));
        }
        assert_eq!(r.finished.len(), FINISHED_MEMORY);
        assert!(!r.is_finished("t0"));
        assert!(r.is_finished(&format!("t{}", FINISHED_MEMORY + 9)));
    }

    #[test]
    fn known_digest_of_abc() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
