//! Error types for pinlink.

use crate::CommandKind;

/// Result type alias for pinlink.
pub type Result<T> = std::result::Result<T, LinkError>;

/// Error type for link operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// The link was closed and refuses further transport activity.
    #[error("link closed")]
    Closed,

    /// Invalid transport target or malformed configuration.
    #[error("invalid config: {0}")]
    Config(String),

    /// Transport read/write failure.
    #[error("io error: {0}")]
    Io(String),

    /// The request could not be encoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The link or its codec cannot express this command.
    #[error("unsupported operation: {0}")]
    Unsupported(CommandKind),
}

impl From<std::io::Error> for LinkError {
    fn from(e: std::io::Error) -> Self {
        LinkError::Io(e.to_string())
    }
}

impl From<url::ParseError> for LinkError {
    fn from(e: url::ParseError) -> Self {
        LinkError::Config(e.to_string())
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn test_link_error_display() {
        assert_eq!(LinkError::Closed.to_string(), "link closed");
        assert_eq!(
            LinkError::Unsupported(CommandKind::Tone).to_string(),
            "unsupported operation: tone"
        );

        let err: LinkError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe").into();
        assert!(matches!(err, LinkError::Io(ref m) if m.contains("pipe")));
    }
}
