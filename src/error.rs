//! Error types shared by the routing and caching layers.

use std::time::Duration;

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The key is neither a registered service override nor a valid tenant identifier.
    #[error("Invalid tenant key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// A well-formed identifier with no matching tenant record.
    #[error("Tenant not found: {key}")]
    TenantNotFound { key: String },

    #[error("Connection failed to {target}: {cause}")]
    ConnectionFailure { target: String, cause: String },

    #[error("Cache unavailable: {cause}")]
    CacheUnavailable { cause: String },

    #[error("Timed out after {after:?} acquiring database for '{key}'")]
    Timeout { key: String, after: Duration },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A query the primary store answered with an error.
    #[error("Database operation failed: {0}")]
    Database(#[source] mongodb::error::Error),

    /// An update tried to change a field fixed at creation.
    #[error("Field '{field}' cannot be modified")]
    ImmutableField { field: String },

    #[error("Database registry has been shut down")]
    ShutDown,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn invalid_key(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    pub fn connection(target: impl Into<String>, cause: impl ToString) -> Self {
        Self::ConnectionFailure {
            target: target.into(),
            cause: cause.to_string(),
        }
    }

    pub fn cache(cause: impl ToString) -> Self {
        Self::CacheUnavailable {
            cause: cause.to_string(),
        }
    }

    /// Whether a caller may retry the operation with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailure { .. } | Self::Timeout { .. } | Self::CacheUnavailable { .. }
        )
    }
}

/// Driver errors meaning the store could not be reached become
/// `ConnectionFailure`; everything else is a `Database` error.
impl From<mongodb::error::Error> for Error {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::{ErrorKind, RETRYABLE_WRITE_ERROR};

        let unreachable = matches!(
            *err.kind,
            ErrorKind::ServerSelection { .. }
                | ErrorKind::Io(_)
                | ErrorKind::ConnectionPoolCleared { .. }
        ) || err.contains_label(RETRYABLE_WRITE_ERROR);

        if unreachable {
            Self::connection("mongodb", err)
        } else {
            Self::Database(err)
        }
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Self::cache(err)
    }
}
