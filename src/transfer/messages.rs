use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::mux::{BULK_CHANNEL, ChannelMessage};

pub const FILE_METADATA: &str = "file-metadata";
/// Older senders announce a transfer with this kind.
pub const FILE_START: &str = "file-start";
pub const FILE_CHUNK_INFO: &str = "file-chunk-info";
pub const FILE_COMPLETE: &str = "file-complete";
pub const FILE_LIST: &str = "file-list";
pub const FILE_REQUEST: &str = "file-request";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub id: String,
    pub name: String,
    pub size: u64,
    #[serde(alias = "type", default)]
    pub mime_type: String,
    /// Chunk geometry the sender uses; absent from older senders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u32>,
}

/// Describes the binary frame that immediately follows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkInfo {
    #[serde(alias = "fileId")]
    pub transfer_id: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileComplete {
    #[serde(alias = "fileId")]
    pub transfer_id: String,
    /// Lowercase hex SHA-256 of the whole source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Ready,
    Downloading,
    Completed,
}

/// One entry of a `file-list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub id: String,
    pub name: String,
    pub size: u64,
    #[serde(alias = "type", default)]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<FileStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
}

impl FileInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>, size: u64, mime_type: &str) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size,
            mime_type: mime_type.to_string(),
            status: Some(FileStatus::Ready),
            progress: Some(0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRequest {
    pub file_id: String,
    pub file_name: String,
}

/// Control messages of the bulk transfer channel.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferMessage {
    Metadata(FileMetadata),
    ChunkInfo(ChunkInfo),
    Complete(FileComplete),
    FileList(Vec<FileInfo>),
    Request(FileRequest),
}

impl TransferMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            TransferMessage::Metadata(_) => FILE_METADATA,
            TransferMessage::ChunkInfo(_) => FILE_CHUNK_INFO,
            TransferMessage::Complete(_) => FILE_COMPLETE,
            TransferMessage::FileList(_) => FILE_LIST,
            TransferMessage::Request(_) => FILE_REQUEST,
        }
    }

    pub fn to_channel_message(&self) -> Result<ChannelMessage, serde_json::Error> {
        let payload = match self {
            TransferMessage::Metadata(m) => serde_json::to_value(m)?,
            TransferMessage::ChunkInfo(c) => serde_json::to_value(c)?,
            TransferMessage::Complete(c) => serde_json::to_value(c)?,
            TransferMessage::FileList(l) => serde_json::to_value(l)?,
            TransferMessage::Request(r) => serde_json::to_value(r)?,
        };
        Ok(ChannelMessage::new(self.kind(), payload).on_channel(BULK_CHANNEL))
    }

    /// `Ok(None)` for kinds this layer does not handle (e.g. `file-chunk-ack`).
    pub fn from_channel_message(msg: &ChannelMessage) -> Result<Option<Self>, serde_json::Error> {
        let payload = msg.payload.clone();
        let parsed = match msg.kind.as_str() {
            FILE_METADATA | FILE_START => TransferMessage::Metadata(from_value(payload)?),
            FILE_CHUNK_INFO => TransferMessage::ChunkInfo(from_value(payload)?),
            FILE_COMPLETE => TransferMessage::Complete(from_value(payload)?),
            FILE_LIST => TransferMessage::FileList(from_value(payload)?),
            FILE_REQUEST => TransferMessage::Request(from_value(payload)?),
            _ => return Ok(None),
        };
        Ok(Some(parsed))
    }
}

fn from_value<T: serde::de::DeserializeOwned>(v: Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(v)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use serde_json::json;

    #[test]
    fn chunk_info_uses_transfer_id_and_accepts_legacy_file_id() {
        let info = TransferMessage::ChunkInfo(ChunkInfo {
            transfer_id: "t1".into(),
            chunk_index: 2,
            total_chunks: 3,
        });
        let msg = info.to_channel_message().unwrap();
        assert_eq!(msg.channel.as_deref(), Some(BULK_CHANNEL));
        assert_eq!(
            msg.payload,
            json!({"transferId": "t1", "chunkIndex": 2, "totalChunks": 3})
        );

        let legacy = ChannelMessage::new(
            FILE_CHUNK_INFO,
            json!({"fileId": "t1", "chunkIndex": 2, "totalChunks": 3}),
        );
        assert_eq!(
            TransferMessage::from_channel_message(&legacy).unwrap(),
            Some(info)
        );
    }

    #[test]
    fn metadata_accepts_type_for_mime_type() {
        let msg = ChannelMessage::new(
            FILE_START,
            json!({"id": "a", "name": "x.txt", "size": 10, "type": "text/plain"}),
        );
        let Some(TransferMessage::Metadata(m)) = TransferMessage::from_channel_message(&msg).unwrap()
        else {
            panic!("expected metadata");
        };
        assert_eq!(m.mime_type, "text/plain");
        assert_eq!(m.chunk_size, None);
    }

    #[test]
    fn file_list_is_a_bare_array() {
        let list = TransferMessage::FileList(vec![FileInfo::new("f1", "a.bin", 3, "")]);
        let msg = list.to_channel_message().unwrap();
        assert_eq!(
            msg.payload,
            json!([{"id": "f1", "name": "a.bin", "size": 3, "mimeType": "",
                    "status": "ready", "progress": 0.0}])
        );
    }

    #[test]
    fn unknown_kinds_are_not_errors() {
        let ack = ChannelMessage::new("file-chunk-ack", json!({"fileId": "a"}));
        assert_eq!(TransferMessage::from_channel_message(&ack).unwrap(), None);

        let broken = ChannelMessage::new(FILE_COMPLETE, json!({"nope": 1}));
        assert!(TransferMessage::from_channel_message(&broken).is_err());
    }
}
