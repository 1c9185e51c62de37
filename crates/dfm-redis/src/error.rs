//! Errors internal to this crate. Callers convert these into [`dfm_core::DfmError`]
//! at the point where a failure becomes user-visible, never earlier.

use thiserror::Error;

/// Result type used throughout `dfm-redis`.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The underlying Redis connection or command failed.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A stored JSON document failed to (de)serialize.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A request id had no persisted state.
    #[error("no state persisted for request {0}")]
    NotFound(String),

    /// A consumer group already existed under a different last-delivered-id; this
    /// is otherwise treated as success (`BUSYGROUP` is idempotent creation).
    #[error("failed to create consumer group {group} on stream {stream}: {reason}")]
    GroupCreate {
        stream: String,
        group: String,
        reason: String,
    },
}

impl From<Error> for dfm_core::DfmError {
    fn from(e: Error) -> Self {
        match e {
            Error::Redis(_) | Error::GroupCreate { .. } => dfm_core::DfmError::resource(e.to_string()),
            Error::Json(_) => dfm_core::DfmError::data(e.to_string(), None),
            Error::NotFound(_) => dfm_core::DfmError::data(e.to_string(), None),
        }
    }
}
