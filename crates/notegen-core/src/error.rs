//! Error types for notegen.

use thiserror::Error;

/// Result type alias using notegen's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for notegen operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed batch request or options
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation not legal in the current processing state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Text generation failed
    #[error("Generation error: {0}")]
    Generation(String),

    /// A transform step could not produce usable output for a document
    #[error("Transform error: {0}")]
    Transform(String),

    /// Document not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// The running batch was aborted by shutdown
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// The orchestrator has been shut down and accepts no more work
    #[error("Orchestrator has been shut down")]
    ShutDown,

    /// Internal (orchestration) error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for failures of the orchestration machinery itself, as opposed
    /// to request validation or per-document failures.
    pub fn is_orchestration_error(&self) -> bool {
        matches!(self, Error::Internal(_) | Error::Cancelled(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
