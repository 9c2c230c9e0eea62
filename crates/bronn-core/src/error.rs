//! Error types for the Bronn core
//!
//! Only failures that reject a single mutating command live here. Routing
//! outcomes such as "not configured" or "suppressed" are ordinary values of
//! [`crate::audit::AuditOutcome`], and sink rejections use
//! [`crate::traits::DeliveryError`].

use thiserror::Error;

/// Result type alias for Bronn operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the Bronn system
#[derive(Error, Debug)]
pub enum Error {
    /// Snapshot store unreachable or a constraint was violated
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input from the command layer
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The actor may not mutate this guild's configuration
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a permission error
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Whether this error came from the snapshot store
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Io(_))
    }

    /// Reclassify any store-originated failure as a persistence error
    pub(crate) fn into_persistence(self) -> Self {
        match self {
            Self::Persistence(_) => self,
            other => Self::Persistence(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
