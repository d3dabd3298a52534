use bytes::Bytes;

use crate::transfer::messages::{FileInfo, FileMetadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Receive,
}

/// A fully reassembled and verified file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    /// The peer announced a transfer.
    Incoming(FileMetadata),
    /// Non-decreasing per transfer; the last one is exactly 100.
    Progress {
        id: String,
        direction: Direction,
        percent: f64,
    },
    /// Every chunk and the completion marker went out.
    Sent { id: String },
    Completed(ReceivedFile),
    Failed {
        id: String,
        direction: Direction,
        reason: String,
    },
    /// The peer asked for one of our listed files.
    FileRequested { file_id: String, file_name: String },
    FileListReceived(Vec<FileInfo>),
}
