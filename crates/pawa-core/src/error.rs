use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a single chat request. Every variant is terminal for that request.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Pawa AI API error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Pawa AI API error {status}: {detail}")]
    Status { status: StatusCode, detail: String },

    #[error("Pawa AI API returned an unreadable payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    /// Whether the backend could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        match self {
            ClientError::Transport(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;
