//! Errors internal to this crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The HTTP transport itself failed (connection refused, timed out, TLS error).
    /// Retryable.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server rejected the request body (422 on `/process`, or any other 4xx).
    /// Not retryable.
    #[error("request rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// `GET /request/responses/:id` was called for an id the server has never seen.
    #[error("unknown request id {0}")]
    UnknownRequest(uuid::Uuid),

    /// The server returned a body that did not decode as the expected JSON shape.
    #[error("response decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A response in the stream carried an Error body; surfaced by
    /// [`crate::raise_on_error`].
    #[error("server reported an error (status {http_status_code}): {message}")]
    ServerReported {
        http_status_code: u16,
        message: String,
        node_id: Option<uuid::Uuid>,
    },

    /// `process()` exhausted its retry budget without a successful attempt.
    #[error("process() exhausted retries: {0}")]
    RetriesExhausted(String),
}

impl Error {
    /// Whether this error is worth retrying: transport-level failures are, server
    /// rejections and decode errors are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_is_not_retryable() {
        let err = Error::Rejected {
            status: 422,
            body: "deadline missing zone".to_string(),
        };
        assert!(!err.is_retryable());
    }
}
