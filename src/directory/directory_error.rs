use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// Transport-level failure or an HTTP status without a usable body.
    Http(String),
    /// The body was not the expected JSON.
    Decode(String),
    /// The directory answered `success: false`.
    Rejected(String),
    /// The directory handed out a code that is not a valid room code.
    InvalidCode(String),
}

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectoryError::Http(e) => write!(f, "room directory unreachable: {e}"),
            DirectoryError::Decode(e) => write!(f, "unexpected room directory response: {e}"),
            DirectoryError::Rejected(m) => write!(f, "room directory refused: {m}"),
            DirectoryError::InvalidCode(c) => write!(f, "room directory returned invalid code '{c}'"),
        }
    }
}

impl std::error::Error for DirectoryError {}

impl From<ureq::Error> for DirectoryError {
    fn from(e: ureq::Error) -> Self {
        DirectoryError::Http(e.to_string())
    }
}

impl From<serde_json::Error> for DirectoryError {
    fn from(e: serde_json::Error) -> Self {
        DirectoryError::Decode(e.to_string())
    }
}
