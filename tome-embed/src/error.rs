//! Error types for the embedding system

/// Result type for embedding operations, using [`EmbedError`].
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for all embedding operations.
///
/// The variant that matters most to callers is [`ProviderUnavailable`]:
/// ingestion treats it as fatal and persists nothing, because an unreachable
/// backend means no vectors can be produced for any chunk.
///
/// [`ProviderUnavailable`]: EmbedError::ProviderUnavailable
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// The embedding backend cannot be reached or failed to serve a request
    /// (local model failed to load, remote endpoint down or timed out).
    #[error("embedding backend unavailable: {message}")]
    ProviderUnavailable { message: String },

    /// The provider configuration is invalid (unknown model name,
    /// inconsistent dimensions, malformed endpoint).
    #[error("invalid embedding configuration: {message}")]
    InvalidConfig { message: String },

    /// IO errors while reading model resources
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Async task join errors
    #[error("async task failed: {source}")]
    TaskJoin {
        #[from]
        source: tokio::task::JoinError,
    },

    /// Generic errors from other libraries
    #[error("external error: {source}")]
    External {
        #[from]
        source: anyhow::Error,
    },
}

impl EmbedError {
    /// Create a [`EmbedError::ProviderUnavailable`] with the given message.
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::ProviderUnavailable {
            message: message.into(),
        }
    }

    /// Create an [`EmbedError::InvalidConfig`] with the given message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
