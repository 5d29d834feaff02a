//! Error types for the CCTP correlator

use thiserror::Error;

/// Failure to turn a raw log or envelope into a typed value
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("No {0} log found in transaction")]
    MissingLog(&'static str),

    #[error("ABI decode of {event} failed: {message}")]
    Abi { event: &'static str, message: String },

    #[error("Unexpected token for field {0}")]
    UnexpectedToken(&'static str),

    #[error("Envelope too short: {len} bytes, header needs {needed}")]
    EnvelopeTooShort { len: usize, needed: usize },

    #[error("No message envelope candidates for burn")]
    NoEnvelope,
}

/// A stored record that cannot be trusted as a match
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Required field {0} is missing or empty")]
    MissingField(&'static str),

    #[error("Record is not a JSON object")]
    NotAnObject,

    #[error("Malformed record: {0}")]
    Malformed(String),
}

/// Key-value store failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error for {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Store backend unavailable: {0}")]
    Unavailable(String),
}

/// Outbound webhook failures
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Webhook returned status {0}")]
    Status(u16),

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Main error type for the correlator
#[derive(Error, Debug)]
pub enum CorrelatorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CorrelatorError {
    /// Check if re-delivering the same event could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CorrelatorError::Store(StoreError::Database(_))
                | CorrelatorError::Store(StoreError::Unavailable(_))
                | CorrelatorError::Notify(_)
        )
    }

    /// Check if error should trigger an alert
    pub fn should_alert(&self) -> bool {
        matches!(
            self,
            CorrelatorError::Store(_) | CorrelatorError::Config(_)
        )
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            CorrelatorError::Config(_) => "config",
            CorrelatorError::Decode(_) => "decode",
            CorrelatorError::Validation(_) => "validation",
            CorrelatorError::Store(_) => "store",
            CorrelatorError::Notify(_) => "notify",
            CorrelatorError::Internal(_) => "internal",
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for correlator operations
pub type CorrelatorResult<T> = Result<T, CorrelatorError>;
