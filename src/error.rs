//! Error types for the panhub host.

use panhub_search::SearchError;

/// Top-level error type for the host process.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Configuration could not be read, parsed or validated.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stdio protocol could not be serviced.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The search core refused to start or serve.
    #[error(transparent)]
    Search(#[from] SearchError),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, HostError>;
