use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::directory::{
    directory_error::DirectoryError,
    room_directory::{DirectoryConfig, RoomDirectory, RoomFile, RoomInfo, validate_files},
};
use crate::log::log_sink::LogSink;
use crate::signaling::RoomCode;
use crate::{sink_debug, sink_info, sink_warn};

/// Envelope every directory response shares.
#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    files: Vec<RoomFile>,
    #[serde(default)]
    exists: Option<bool>,
    #[serde(default, alias = "senderOnline")]
    sender_online: bool,
    #[serde(default, alias = "receiverOnline")]
    receiver_online: bool,
    #[serde(default)]
    room: Option<RoomReply>,
}

#[derive(Debug, Deserialize)]
struct RoomReply {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    files: Vec<RoomFile>,
}

/// Room directory reached over HTTP.
///
/// `POST {base}/create-room` with `{"files":[...]}` allocates a code;
/// `GET {base}/room-info?code=XXXXXX` reports the room.
pub struct HttpRoomDirectory {
    base_url: String,
    agent: ureq::Agent,
    log: Arc<dyn LogSink>,
}

impl HttpRoomDirectory {
    pub fn new(cfg: DirectoryConfig, log: Arc<dyn LogSink>) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(cfg.timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            agent,
            log,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn read_reply(&self, what: &str, mut resp: ureq::http::Response<ureq::Body>) -> Result<Reply, DirectoryError> {
        let status = resp.status();
        let body = resp.body_mut().read_to_string()?;
        sink_debug!(self.log, "{} -> {} ({} bytes)", what, status, body.len());

        let reply: Reply = match serde_json::from_str(&body) {
            Ok(r) => r,
            Err(e) if status.is_success() => return Err(e.into()),
            Err(_) => return Err(DirectoryError::Http(format!("{what} returned {status}"))),
        };
        if !status.is_success() || !reply.success {
            let message = if reply.message.is_empty() {
                format!("{what} returned {status}")
            } else {
                reply.message
            };
            sink_warn!(self.log, "{} refused: {}", what, message);
            return Err(DirectoryError::Rejected(message));
        }
        Ok(reply)
    }
}

impl RoomDirectory for HttpRoomDirectory {
    fn create_room(&self, files: &[RoomFile]) -> Result<RoomCode, DirectoryError> {
        validate_files(files)?;
        let url = format!("{}/create-room", self.base_url);
        let resp = self.agent.post(&url).send_json(json!({ "files": files }))?;
        let reply = self.read_reply("create-room", resp)?;

        let raw = reply
            .code
            .ok_or_else(|| DirectoryError::Decode("create-room reply has no code".into()))?;
        let code = RoomCode::parse(&raw).map_err(|_| DirectoryError::InvalidCode(raw.clone()))?;
        sink_info!(self.log, "directory allocated room {} for {} files", code.as_str(), files.len());
        Ok(code)
    }

    fn room_info(&self, code: &RoomCode) -> Result<RoomInfo, DirectoryError> {
        let url = format!("{}/room-info", self.base_url);
        let resp = self.agent.get(&url).query("code", code.as_str()).call()?;
        let reply = self.read_reply("room-info", resp)?;

        if reply.exists == Some(false) {
            return Err(DirectoryError::Rejected(format!("room {} does not exist", code.as_str())));
        }
        let (listed_code, files) = match reply.room {
            Some(room) => (room.code.or(reply.code), room.files),
            None => (reply.code, reply.files),
        };
        let code = match listed_code {
            Some(raw) => Some(RoomCode::parse(&raw).map_err(|_| DirectoryError::InvalidCode(raw))?),
            None => Some(code.clone()),
        };
        Ok(RoomInfo {
            code,
            files,
            initiator_online: reply.sender_online,
            joiner_online: reply.receiver_online,
        })
    }
}
