//! Error types for storewatch.

use std::fmt;

/// Result type alias for storewatch operations.
pub type Result<T> = std::result::Result<T, WatchError>;

/// Errors that can occur when watching a store or working with a synced view.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The store could not be read right now (locked, contended, I/O hiccup).
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The persisted marker could not be interpreted.
    #[error("Invalid modification marker: {0}")]
    InvalidMarker(String),

    /// IO error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Watch settings failed validation.
    #[error("Settings validation failed: {0}")]
    ValidationError(String),

    /// Watch settings could not be loaded from their sources.
    #[error("Failed to load settings: {0}")]
    SettingsError(String),

    /// The consumer's loader failed to produce a fresh snapshot.
    #[error("Failed to load view: {0}")]
    LoadError(String),

    /// The consumer's writer failed to persist a snapshot.
    #[error("Failed to save view: {0}")]
    SaveError(String),

    /// The builder was asked to build a watcher without a store.
    #[error("No marker store configured")]
    MissingStore,

    /// The poll loop needs a tokio runtime to run on.
    #[error("No tokio runtime available to run the poll loop")]
    NoRuntime,

    /// A save was attempted against a view that has been reloaded since.
    #[error("View is stale: captured generation {expected}, current generation {current}")]
    StaleView {
        /// Generation the caller captured before preparing its save
        expected: u64,
        /// Generation of the view at the time of the save
        current: u64,
    },
}

impl WatchError {
    /// Whether this error is a transient store read failure that the next
    /// poll tick may recover from.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::IoError(_))
    }
}

/// Validation error for watch settings.
#[derive(Debug)]
pub enum ValidationError {
    /// A specific field has an invalid value.
    InvalidField {
        /// The field name
        field: String,
        /// The reason why it's invalid
        reason: String,
    },
}

impl ValidationError {
    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidField { field, reason } => {
                write!(f, "Field '{}' is invalid: {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for WatchError {
    fn from(err: ValidationError) -> Self {
        WatchError::ValidationError(err.to_string())
    }
}

impl From<config::ConfigError> for WatchError {
    fn from(err: config::ConfigError) -> Self {
        WatchError::SettingsError(err.to_string())
    }
}
