use thiserror::Error;

/// Errors produced by the transporter and its store connectors.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Unrecoverable configuration or dependency problem.
    ///
    /// Always reported to the broker's `fatal` hook before being returned.
    /// Never retried.
    #[error("fatal transporter error: {0}")]
    Fatal(String),

    /// A builder was asked to build without a required collaborator.
    #[error("missing required configuration: {0}")]
    MissingConfig(String),

    /// A command cannot be placed in a channel's command field: it is empty
    /// or contains the `.` separator.
    #[error("invalid command `{0}`: must be non-empty and contain no `.`")]
    InvalidCommand(String),

    /// No live connection handle exists for the requested operation.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Store-level failure (network error, rejected command, closed actor).
    #[error("transport error: {0}")]
    Transport(String),

    /// Store-level failure that may succeed if attempted again
    /// (e.g. sentinel still electing a new master).
    #[error("transport error (retryable): {0}")]
    TransportRetryable(String),

    /// JSON serialization of an outbound packet failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for transporter operations
pub type Result<T> = std::result::Result<T, TransportError>;
