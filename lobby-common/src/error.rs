//! Error types shared by the lobby herald crates.

use thiserror::Error;

/// Result type alias using the shared error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A task channel was closed
    #[error("Channel send error")]
    ChannelSend,

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping context wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Extension trait for adding context to any error type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_with_context() {
        let err = Error::ChannelSend;
        let with_ctx = err.with_context("flushing snapshot");
        assert!(matches!(with_ctx, Error::WithContext { .. }));
        assert!(matches!(with_ctx.root(), Error::ChannelSend));
        assert_eq!(with_ctx.to_string(), "flushing snapshot: Channel send error");
    }

    #[test]
    fn test_result_ext_context() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only",
        ));
        let err = result.context("writing snapshot").unwrap_err();
        assert!(matches!(err.root(), Error::Io(_)));
    }
}
