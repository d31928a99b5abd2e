//! Error types for the Hearth engine.

use thiserror::Error;

/// All possible errors from the Hearth engine.
///
/// Data-level problems (missing keys, corrupt blobs, malformed snapshots) are
/// not errors: they degrade to "absent" or to the sentinel snapshot. Only
/// failures of the collaborators surface here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Collaborator errors
    #[error("storage error: {0}")]
    Storage(String),

    #[error("transport error: {0}")]
    Transport(String),

    // Value errors
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid peer id: {0:?}")]
    InvalidPeerId(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::Storage("disk full".into());
        assert_eq!(err.to_string(), "storage error: disk full");

        let err = Error::InvalidPeerId("  ".into());
        assert_eq!(err.to_string(), "invalid peer id: \"  \"");
    }

    #[test]
    fn from_serde_json() {
        let parse_err = serde_json::from_str::<u64>("nope").unwrap_err();
        let err: Error = parse_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
