//! Error types for seance-core

use thiserror::Error;

/// Main error type for the seance-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Raw failure from the outbound procedure boundary.
    ///
    /// This is what the invoker propagates once retries are exhausted.
    #[error("backend call '{operation}' failed: {message}")]
    Backend { operation: String, message: String },

    /// Fetch failure scoped to a single cache entry
    #[error("fetch failed for {key}: {message}")]
    Fetch { key: String, message: String },

    /// Preference persistence failure (fire-and-forget, logged only)
    #[error("failed to persist preference for session {session_id}: {message}")]
    Persist { session_id: String, message: String },

    /// Failure inside a refresh callback (caught by the monitor, never re-thrown)
    #[error("refresh failed: {0}")]
    Refresh(String),

    /// JSON decoding error at the procedure boundary
    #[error("JSON error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for seance-core
pub type Result<T> = std::result::Result<T, Error>;
