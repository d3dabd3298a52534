use std::time::Duration;

use crate::config::Config;
use crate::log::log_sink::LogSink;
use crate::sink_warn;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SLOW_PEER_FACTOR: u32 = 2;
pub const DEFAULT_ICE_GATHER_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_DATA_CHANNEL_LABEL: &str = "shared-channel";
pub const DEFAULT_SIGNALING_CHANNEL: &str = "shared";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Joiner only: from `connect()` to a usable channel.
    pub connect_timeout: Duration,
    pub slow_peer_timeout_factor: u32,
    /// Initiator: longest wait for candidate gathering before the offer goes out.
    pub ice_gather_timeout: Duration,
    pub data_channel_label: String,
    /// Label sent to the rendezvous to group signaling sessions.
    pub signaling_channel: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            slow_peer_timeout_factor: DEFAULT_SLOW_PEER_FACTOR,
            ice_gather_timeout: DEFAULT_ICE_GATHER_TIMEOUT,
            data_channel_label: DEFAULT_DATA_CHANNEL_LABEL.to_string(),
            signaling_channel: Some(DEFAULT_SIGNALING_CHANNEL.to_string()),
        }
    }
}

impl SessionConfig {
    /// Reads `[session]` and `[signaling] channel`; malformed values are
    /// reported and replaced by defaults.
    pub fn from_config(cfg: &Config, log: &dyn LogSink) -> Self {
        let mut out = Self::default();
        match cfg.get_parsed::<u64>("session", "connect_timeout_ms") {
            Ok(Some(ms)) => out.connect_timeout = Duration::from_millis(ms),
            Ok(None) => {}
            Err(raw) => sink_warn!(log, "bad session.connect_timeout_ms '{}', using default", raw),
        }
        match cfg.get_parsed::<u32>("session", "slow_peer_timeout_factor") {
            Ok(Some(f)) if f >= 1 => out.slow_peer_timeout_factor = f,
            Ok(None) => {}
            _ => sink_warn!(log, "bad session.slow_peer_timeout_factor, using default"),
        }
        match cfg.get_parsed::<u64>("session", "ice_gather_timeout_ms") {
            Ok(Some(ms)) => out.ice_gather_timeout = Duration::from_millis(ms),
            Ok(None) => {}
            Err(raw) => sink_warn!(log, "bad session.ice_gather_timeout_ms '{}', using default", raw),
        }
        if let Some(label) = cfg.get_non_empty("session", "data_channel_label") {
            out.data_channel_label = label.to_string();
        }
        match cfg.get("signaling", "channel") {
            Some("") => out.signaling_channel = None,
            Some(ch) => out.signaling_channel = Some(ch.to_string()),
            None => {}
        }
        out
    }

    /// Effective joiner timeout for a stack of the given speed.
    pub fn connect_timeout_for(&self, slow: bool) -> Duration {
        if slow {
            self.connect_timeout * self.slow_peer_timeout_factor
        } else {
            self.connect_timeout
        }
    }
}
