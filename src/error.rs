//! Error taxonomy for a replay session.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReplayError>;

#[derive(Debug, Error)]
pub enum ReplayError {
    /// Channel failed to open, dropped mid-stream, or rejected a write.
    #[error("transport error: {0}")]
    Transport(String),

    /// Inbound payload did not decode into a known message kind.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The backend reported an error message.
    #[error("simulation error: {0}")]
    Remote(String),

    /// Remote side closed the channel with a non-normal close code.
    #[error("connection closed abnormally (code {code}): {reason}")]
    AbnormalClose { code: u16, reason: String },

    /// The caller ended the session with an error reason.
    #[error("session aborted")]
    Aborted,

    #[error("invalid session parameters: {0}")]
    InvalidParams(String),

    #[error("invalid control command: {0}")]
    InvalidControl(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

impl ReplayError {
    /// True for failures that end the session (everything but local
    /// validation errors).
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ReplayError::InvalidParams(_) | ReplayError::InvalidControl(_) | ReplayError::Config(_)
        )
    }
}
