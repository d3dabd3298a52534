use crate::config::Config;

pub const DEFAULT_SIGNALING_URL: &str = "ws://127.0.0.1:8080/ws/webrtc";

/// `[signaling]` section: where the rendezvous relay listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalingConfig {
    pub url: String,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SIGNALING_URL.to_string(),
        }
    }
}

impl SignalingConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            url: cfg
                .get_non_empty_or_default("signaling", "url", DEFAULT_SIGNALING_URL)
                .to_string(),
        }
    }
}
