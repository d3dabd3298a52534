use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::signaling::role::Role;

/// A connection description produced by the peer-connection capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
}

/// One network reachability hint. An empty `candidate` marks the end of
/// gathering and is still forwarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerJoined {
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStatus {
    pub code: String,
    pub initiator_online: bool,
    pub joiner_online: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalError {
    pub message: String,
}

/// Wire unit of the signaling channel: `{"type": ..., "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum SignalEnvelope {
    Offer(SessionDescription),
    Answer(SessionDescription),
    IceCandidate(IceCandidate),
    PeerJoined(PeerJoined),
    RoomStatus(RoomStatus),
    Error(SignalError),
}

const KNOWN_TYPES: [&str; 6] = [
    "offer",
    "answer",
    "ice-candidate",
    "peer-joined",
    "room-status",
    "error",
];

#[derive(Debug)]
pub enum EnvelopeError {
    /// Not JSON, or not an object.
    Malformed(String),
    UnknownType(String),
    /// Known type whose payload failed to decode or validate.
    InvalidPayload { kind: String, reason: String },
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeError::Malformed(e) => write!(f, "malformed envelope: {e}"),
            EnvelopeError::UnknownType(t) => write!(f, "unknown envelope type '{t}'"),
            EnvelopeError::InvalidPayload { kind, reason } => {
                write!(f, "invalid '{kind}' payload: {reason}")
            }
        }
    }
}

impl std::error::Error for EnvelopeError {}

impl SignalEnvelope {
    pub fn offer(sdp: impl Into<String>) -> Self {
        SignalEnvelope::Offer(SessionDescription { sdp: sdp.into() })
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        SignalEnvelope::Answer(SessionDescription { sdp: sdp.into() })
    }

    pub fn error(message: impl Into<String>) -> Self {
        SignalEnvelope::Error(SignalError {
            message: message.into(),
        })
    }

    /// Wire name of the variant, for logs. Never logs SDP bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            SignalEnvelope::Offer(_) => "offer",
            SignalEnvelope::Answer(_) => "answer",
            SignalEnvelope::IceCandidate(_) => "ice-candidate",
            SignalEnvelope::PeerJoined(_) => "peer-joined",
            SignalEnvelope::RoomStatus(_) => "room-status",
            SignalEnvelope::Error(_) => "error",
        }
    }

    pub fn encode(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string(self).map_err(|e| EnvelopeError::Malformed(e.to_string()))
    }

    /// Parses and validates one text frame.
    ///
    /// Unknown `type`s are reported separately from bad payloads so relays
    /// can ignore newer message kinds without treating them as garbage.
    pub fn decode(text: &str) -> Result<Self, EnvelopeError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
        let Some(kind) = value.get("type").and_then(Value::as_str) else {
            return Err(EnvelopeError::Malformed("missing string field 'type'".into()));
        };
        if !KNOWN_TYPES.contains(&kind) {
            return Err(EnvelopeError::UnknownType(kind.to_string()));
        }
        let kind = kind.to_string();
        let env: SignalEnvelope =
            serde_json::from_value(value).map_err(|e| EnvelopeError::InvalidPayload {
                kind: kind.clone(),
                reason: e.to_string(),
            })?;
        env.validate().map_err(|reason| EnvelopeError::InvalidPayload { kind, reason })?;
        Ok(env)
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            SignalEnvelope::Offer(d) | SignalEnvelope::Answer(d) if d.sdp.trim().is_empty() => {
                Err("empty sdp".into())
            }
            SignalEnvelope::RoomStatus(s) if s.code.is_empty() => Err("empty room code".into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn offer_uses_type_and_payload_fields() {
        let text = SignalEnvelope::offer("v=0").encode().expect("encodes");
        let v: Value = serde_json::from_str(&text).expect("json");
        assert_eq!(v["type"], "offer");
        assert_eq!(v["payload"]["sdp"], "v=0");
    }

    #[test]
    fn decodes_browser_style_candidate() {
        let text = r#"{"type":"ice-candidate","payload":{"candidate":"candidate:1 1 udp 1 10.0.0.2 5000 typ host","sdpMid":"0","sdpMLineIndex":0}}"#;
        match SignalEnvelope::decode(text).expect("valid") {
            SignalEnvelope::IceCandidate(c) => {
                assert_eq!(c.sdp_mid.as_deref(), Some("0"));
                assert_eq!(c.sdp_m_line_index, Some(0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn peer_joined_accepts_legacy_role_names() {
        let env = SignalEnvelope::decode(r#"{"type":"peer-joined","payload":{"role":"receiver"}}"#)
            .expect("valid");
        assert_eq!(env, SignalEnvelope::PeerJoined(PeerJoined { role: Role::Joiner }));
    }

    #[test]
    fn room_status_is_camel_case() {
        let env = SignalEnvelope::RoomStatus(RoomStatus {
            code: "ABC123".into(),
            initiator_online: true,
            joiner_online: false,
        });
        let text = env.encode().expect("encodes");
        assert!(text.contains("\"initiatorOnline\":true"));
        assert_eq!(SignalEnvelope::decode(&text).expect("valid"), env);
    }

    #[test]
    fn classifies_bad_input() {
        assert!(matches!(
            SignalEnvelope::decode("not json"),
            Err(EnvelopeError::Malformed(_))
        ));
        assert!(matches!(
            SignalEnvelope::decode(r#"{"payload":{}}"#),
            Err(EnvelopeError::Malformed(_))
        ));
        assert!(matches!(
            SignalEnvelope::decode(r#"{"type":"file-list","payload":[]}"#),
            Err(EnvelopeError::UnknownType(t)) if t == "file-list"
        ));
        assert!(matches!(
            SignalEnvelope::decode(r#"{"type":"answer","payload":{"sdp":"  "}}"#),
            Err(EnvelopeError::InvalidPayload { kind, .. }) if kind == "answer"
        ));
        assert!(matches!(
            SignalEnvelope::decode(r#"{"type":"offer","payload":{"nope":1}}"#),
            Err(EnvelopeError::InvalidPayload { .. })
        ));
    }
}
