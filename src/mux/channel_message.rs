use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Control message on the shared data channel:
/// `{"type": ..., "payload": ..., "channel": ...}` sent as one text frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    /// Logical channel. Messages without one are broadcast to every handler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

impl ChannelMessage {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            channel: None,
        }
    }

    pub fn on_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use serde_json::json;

    #[test]
    fn channel_field_is_optional_on_the_wire() {
        let plain = ChannelMessage::new("text-sync", json!({"text": "hi"}));
        assert_eq!(
            plain.encode().expect("encodes"),
            r#"{"type":"text-sync","payload":{"text":"hi"}}"#
        );

        let tagged = plain.clone().on_channel("text-transfer");
        let back = ChannelMessage::decode(&tagged.encode().expect("encodes")).expect("decodes");
        assert_eq!(back.channel.as_deref(), Some("text-transfer"));
    }

    #[test]
    fn missing_payload_decodes_as_null() {
        let m = ChannelMessage::decode(r#"{"type":"ping"}"#).expect("decodes");
        assert_eq!(m.payload, Value::Null);
        assert!(ChannelMessage::decode(r#"{"payload":{}}"#).is_err());
    }
}
