use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::directory::directory_error::DirectoryError;
use crate::signaling::RoomCode;
use crate::transfer::FileInfo;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080/api";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// File entry as the directory stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomFile {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    pub size: u64,
    #[serde(rename = "type", alias = "mimeType", default)]
    pub mime_type: String,
    #[serde(rename = "lastModified", default)]
    pub last_modified: i64,
}

impl RoomFile {
    pub fn new(name: impl Into<String>, size: u64, mime_type: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            size,
            mime_type: mime_type.into(),
            last_modified: 0,
        }
    }

    /// The entry as it is announced over the data channel.
    pub fn to_file_info(&self) -> FileInfo {
        FileInfo::new(self.id.clone(), self.name.clone(), self.size, &self.mime_type)
    }
}

/// What the directory knows about one room.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoomInfo {
    pub code: Option<RoomCode>,
    pub files: Vec<RoomFile>,
    pub initiator_online: bool,
    pub joiner_online: bool,
}

/// Allocation and lookup of room codes.
pub trait RoomDirectory: Send + Sync {
    fn create_room(&self, files: &[RoomFile]) -> Result<RoomCode, DirectoryError>;
    fn room_info(&self, code: &RoomCode) -> Result<RoomInfo, DirectoryError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl DirectoryConfig {
    /// Reads `[directory] base_url` and `timeout_ms`.
    pub fn from_config(cfg: &Config) -> Self {
        let mut out = Self::default();
        if let Some(url) = cfg.get_non_empty("directory", "base_url") {
            out.base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(Some(ms)) = cfg.get_parsed::<u64>("directory", "timeout_ms") {
            out.timeout = Duration::from_millis(ms);
        }
        out
    }
}

/// Mirrors the directory's own checks so both implementations agree.
pub(crate) fn validate_files(files: &[RoomFile]) -> Result<(), DirectoryError> {
    if files.is_empty() {
        return Err(DirectoryError::Rejected("at least one file is required".into()));
    }
    for f in files {
        if f.name.is_empty() {
            return Err(DirectoryError::Rejected("file name must not be empty".into()));
        }
        if f.size == 0 {
            return Err(DirectoryError::Rejected(format!("file '{}' is empty", f.name)));
        }
    }
    Ok(())
}
