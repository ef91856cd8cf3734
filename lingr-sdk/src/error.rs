//! Errors returned by [`LingrClient`](crate::client::LingrClient) calls.

/// Failure of a single remote API call.
#[derive(Debug, thiserror::Error)]
pub enum LingrError {
    /// Network failure, timeout, or non-2xx HTTP status.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// Response body was not the JSON shape we expected.
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    /// The service answered, but with a non-"ok" status.
    #[error("remote status {status}: {detail}")]
    Status { status: String, detail: String },
    /// A session-scoped call was made before `create_session` succeeded.
    #[error("no session established")]
    NoSession,
}

impl LingrError {
    /// Whether the failure is expected steady-state noise on a long-poll
    /// (idle timeouts, dropped connections, truncated bodies).
    pub fn is_transient(&self) -> bool {
        matches!(self, LingrError::Transport(_) | LingrError::Decode(_))
    }
}

pub type Result<T> = std::result::Result<T, LingrError>;
