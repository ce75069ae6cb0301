// Error taxonomy for the settings core

use thiserror::Error;

/// Boxed backend error carried by the storage / propagation variants
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Bad input shape: missing guild id, cross-guild submission
    #[error("invalid config: {0}")]
    Validation(String),

    /// Persistence backend failed; nothing downstream ran
    #[error("storage backend failure: {0}")]
    Storage(#[source] BoxError),

    /// Flag cache or broadcast bus failed after a durable save
    #[error("propagation failure: {0}")]
    Propagation(#[source] BoxError),

    /// Caller deadline passed before the config was saved
    #[error("deadline exceeded before the config was saved")]
    DeadlineExceeded,
}

impl ConfigError {
    pub fn storage(err: impl Into<BoxError>) -> Self {
        Self::Storage(err.into())
    }

    pub fn propagation(err: impl Into<BoxError>) -> Self {
        Self::Propagation(err.into())
    }

    /// Whether this error should be shown to the user as a failed update
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Self::Propagation(_))
    }
}

pub type Result<T, E = ConfigError> = std::result::Result<T, E>;
