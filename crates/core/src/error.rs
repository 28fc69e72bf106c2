//! Error types for the session core

/// Result type alias using the session core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while negotiating or running a session
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Relay transport error (send failed, connection lost)
    #[error("Relay error: {0}")]
    RelayError(String),

    /// Offer/answer negotiation error
    #[error("Negotiation error: {0}")]
    NegotiationError(String),

    /// Media engine operation error
    #[error("Engine error: {0}")]
    EngineError(String),

    /// Connectivity candidate error
    #[error("Candidate error: {0}")]
    CandidateError(String),

    /// Media track operation error
    #[error("Media track error: {0}")]
    MediaTrackError(String),

    /// Capture device or display access refused by the user or OS
    #[error("Capture denied: {0}")]
    CaptureDenied(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The session has been closed and can no longer accept operations
    #[error("Session closed")]
    SessionClosed,

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is recoverable by retrying or by periodic resend
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RelayError(_) | Error::IoError(_) | Error::NegotiationError(_)
        )
    }

    /// Check if this error is fatal for a single user action but not the session
    pub fn is_action_scoped(&self) -> bool {
        matches!(self, Error::CaptureDenied(_) | Error::MediaTrackError(_))
    }
}
