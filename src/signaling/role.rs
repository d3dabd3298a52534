use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::signaling::signaling_error::SignalingError;

/// Which side of a room a peer occupies. The initiator creates the offer,
/// the joiner answers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "sender")]
    Initiator,
    #[serde(alias = "receiver")]
    Joiner,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Initiator => "initiator",
            Role::Joiner => "joiner",
        }
    }

    pub fn other(self) -> Role {
        match self {
            Role::Initiator => Role::Joiner,
            Role::Joiner => Role::Initiator,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = SignalingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "initiator" | "sender" => Ok(Role::Initiator),
            "joiner" | "receiver" => Ok(Role::Joiner),
            _ => Err(SignalingError::InvalidRole(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_both_vocabularies() {
        assert_eq!("sender".parse::<Role>().ok(), Some(Role::Initiator));
        assert_eq!("Receiver".parse::<Role>().ok(), Some(Role::Joiner));
        assert_eq!("joiner".parse::<Role>().ok(), Some(Role::Joiner));
        assert!("viewer".parse::<Role>().is_err());
    }

    #[test]
    fn serde_uses_canonical_names_and_reads_aliases() {
        assert_eq!(
            serde_json::to_string(&Role::Initiator).ok().as_deref(),
            Some("\"initiator\"")
        );
        let r: Role = serde_json::from_str("\"receiver\"").unwrap_or(Role::Initiator);
        assert_eq!(r, Role::Joiner);
    }
}
