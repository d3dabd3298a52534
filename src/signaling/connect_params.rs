use crate::signaling::{role::Role, room_code::RoomCode, signaling_error::SignalingError};

/// Parameters embedded in the signaling connection request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub code: RoomCode,
    pub role: Role,
    /// Optional label grouping several signaling sessions on one relay.
    pub channel: Option<String>,
}

impl ConnectParams {
    pub fn new(code: RoomCode, role: Role) -> Self {
        Self {
            code,
            role,
            channel: None,
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// `code=AB12CD&role=initiator[&channel=...]`
    pub fn to_query(&self) -> String {
        let mut q = format!("code={}&role={}", self.code, self.role);
        if let Some(ch) = &self.channel {
            q.push_str("&channel=");
            q.push_str(&percent_encode(ch));
        }
        q
    }

    /// Appends the query to `base`, keeping any query `base` already has.
    pub fn url_for(&self, base: &str) -> String {
        let sep = if base.contains('?') { '&' } else { '?' };
        format!("{base}{sep}{}", self.to_query())
    }

    /// Parses the query part of a connection request. Unknown keys are ignored.
    pub fn from_query(query: &str) -> Result<Self, SignalingError> {
        let mut code = None;
        let mut role = None;
        let mut channel = None;
        for pair in query.trim_start_matches('?').split('&') {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            let v = percent_decode(v);
            match k {
                "code" => code = Some(RoomCode::parse(&v)?),
                "role" => role = Some(v.parse::<Role>()?),
                "channel" if !v.is_empty() => channel = Some(v),
                _ => {}
            }
        }
        Ok(Self {
            code: code.ok_or(SignalingError::MissingParam("code"))?,
            role: role.ok_or(SignalingError::MissingParam("role"))?,
            channel,
        })
    }
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let escaped = match bytes[i] {
            b'%' if i + 2 < bytes.len() => hex_val(bytes[i + 1])
                .zip(hex_val(bytes[i + 2]))
                .map(|(hi, lo)| hi << 4 | lo),
            _ => None,
        };
        match (escaped, bytes[i]) {
            (Some(b), _) => {
                out.push(b);
                i += 3;
            }
            (None, b'+') => {
                out.push(b' ');
                i += 1;
            }
            (None, b) => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}
