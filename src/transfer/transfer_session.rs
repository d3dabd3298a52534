use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Pending,
    InProgress,
    Complete,
    Aborted,
}

/// Bookkeeping for one chunked transfer, on either side.
#[derive(Debug, Clone)]
pub struct TransferSession {
    pub id: String,
    pub name: String,
    pub total_size: u64,
    pub mime_type: String,
    pub chunk_size: u32,
    pub total_chunks: u32,
    chunks_done: BTreeSet<u32>,
    pub state: TransferState,
}

impl TransferSession {
    pub fn new(id: String, name: String, total_size: u64, mime_type: String, chunk_size: u32) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            total_chunks: chunk_count(total_size, chunk_size),
            id,
            name,
            total_size,
            mime_type,
            chunk_size,
            chunks_done: BTreeSet::new(),
            state: TransferState::Pending,
        }
    }

    /// Byte range `[start, end)` of chunk `index`.
    pub fn chunk_range(&self, index: u32) -> (u64, u64) {
        let start = u64::from(index) * u64::from(self.chunk_size);
        let end = (start + u64::from(self.chunk_size)).min(self.total_size);
        (start.min(self.total_size), end)
    }

    /// Returns false if `index` was already recorded.
    pub fn mark_done(&mut self, index: u32) -> bool {
        self.chunks_done.insert(index)
    }

    pub fn is_done(&self, index: u32) -> bool {
        self.chunks_done.contains(&index)
    }

    pub fn done_count(&self) -> u32 {
        u32::try_from(self.chunks_done.len()).unwrap_or(u32::MAX)
    }

    /// Lowest index never recorded, if any.
    pub fn first_missing(&self) -> Option<u32> {
        (0..self.total_chunks).find(|i| !self.chunks_done.contains(i))
    }

    /// `done / total * 100` rounded to one decimal; 100 for empty sources.
    pub fn progress(&self) -> f64 {
        if self.total_chunks == 0 {
            return 100.0;
        }
        percent(self.done_count(), self.total_chunks)
    }
}

/// `ceil(size / chunk_size)`.
pub fn chunk_count(size: u64, chunk_size: u32) -> u32 {
    let cs = u64::from(chunk_size.max(1));
    u32::try_from(size.div_ceil(cs)).unwrap_or(u32::MAX)
}

pub fn percent(done: u32, total: u32) -> f64 {
    if total == 0 {
        return 100.0;
    }
    let raw = f64::from(done) / f64::from(total) * 100.0;
    (raw * 10.0).round() / 10.0
}
