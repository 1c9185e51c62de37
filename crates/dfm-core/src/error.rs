//! Error taxonomy for the DFM core.
//!
//! `DfmError` realizes the taxonomy from the platform's error handling design: every
//! failure that can become a user-visible `ErrorResponse` carries an HTTP-like status
//! code via [`DfmError::http_status_code`].

use thiserror::Error;

/// Result type used throughout `dfm-core`.
pub type Result<T> = std::result::Result<T, Error>;

/// Low-level errors internal to this crate (block stack misuse, id collisions, codec
/// failures). These are programming errors or malformed wire data, not the user-facing
/// taxonomy — see [`DfmError`] for that.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// No block is active on the current task's block stack.
    #[error("no surrounding Process or block context found")]
    NoSurroundingBlock,

    /// Attempted to pop a block that is not on top of the stack.
    #[error("illegal pop from block stack: popping block that was not on top")]
    IllegalBlockPop,

    /// Attempted to pop from an empty block stack.
    #[error("tried to pop block from empty stack")]
    EmptyBlockStack,

    /// A FunctionCall reference did not resolve to a known node id.
    #[error("reference to unknown node id {0}")]
    UnknownNodeId(uuid::Uuid),

    /// Two distinct nodes were registered under the same node id within one process.
    #[error("duplicate node id {0} within process")]
    DuplicateNodeId(uuid::Uuid),

    /// A deadline was supplied without an explicit timezone.
    #[error("deadline must carry an explicit timezone")]
    DeadlineMissingZone,

    /// JSON (de)serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The dataflow graph contains a cycle, detected during compilation.
    #[error("pipeline graph contains a cycle at or reachable from node {0}")]
    CyclicGraph(uuid::Uuid),
}

/// The user-facing error taxonomy described by the platform's error handling design.
///
/// Every variant maps to exactly one HTTP-like status code; adapters and services
/// convert their own internal errors into one of these variants at the point where the
/// error becomes visible to a client, never earlier.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum DfmError {
    /// The client supplied invalid data: a malformed schema, or a selection that is
    /// provably impossible (e.g. failed advisor validation). Maps to HTTP 400.
    #[error("data error{}: {message}", field.as_deref().map(|f| format!(" (field {f})")).unwrap_or_default())]
    DataError {
        /// Human-readable description of what was wrong.
        message: String,
        /// The offending field name, when known.
        field: Option<String>,
    },

    /// An adapter method required by the current operation was not implemented. Maps
    /// to HTTP 501.
    #[error("missing implementation: {message}")]
    MissingImplementation {
        /// Human-readable description of the missing capability.
        message: String,
    },

    /// An upstream dependency (provider API, cache backend, pubsub broker) was
    /// unavailable. Maps to HTTP 503.
    #[error("resource error: {message}")]
    ResourceError {
        /// Human-readable description of the unavailable resource.
        message: String,
    },

    /// An internal invariant was violated. Maps to HTTP 500.
    #[error("server error: {message}")]
    ServerError {
        /// Human-readable description of the violated invariant.
        message: String,
    },

    /// Anything uncaught, wrapped with the original message and an optional traceback
    /// rendering. Maps to HTTP 500.
    #[error("internal error: {message}")]
    Generic {
        /// The original error's display message.
        message: String,
        /// A best-effort traceback/context rendering, when available.
        traceback: Option<String>,
    },
}

impl DfmError {
    /// The HTTP-like status code this error variant maps to.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            DfmError::DataError { .. } => 400,
            DfmError::MissingImplementation { .. } => 501,
            DfmError::ResourceError { .. } => 503,
            DfmError::ServerError { .. } => 500,
            DfmError::Generic { .. } => 500,
        }
    }

    /// Build a `DataError` naming the offending field.
    pub fn data(message: impl Into<String>, field: Option<String>) -> Self {
        DfmError::DataError {
            message: message.into(),
            field,
        }
    }

    /// Build a `MissingImplementation`.
    pub fn missing_implementation(message: impl Into<String>) -> Self {
        DfmError::MissingImplementation {
            message: message.into(),
        }
    }

    /// Build a `ResourceError`.
    pub fn resource(message: impl Into<String>) -> Self {
        DfmError::ResourceError {
            message: message.into(),
        }
    }

    /// Build a `ServerError`.
    pub fn server(message: impl Into<String>) -> Self {
        DfmError::ServerError {
            message: message.into(),
        }
    }
}

impl From<Error> for DfmError {
    fn from(e: Error) -> Self {
        match e {
            Error::NoSurroundingBlock
            | Error::IllegalBlockPop
            | Error::EmptyBlockStack
            | Error::DuplicateNodeId(_) => DfmError::ServerError {
                message: e.to_string(),
            },
            Error::UnknownNodeId(_) | Error::DeadlineMissingZone | Error::Json(_) => {
                DfmError::DataError {
                    message: e.to_string(),
                    field: None,
                }
            }
            Error::CyclicGraph(_) => DfmError::DataError {
                message: e.to_string(),
                field: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(
            DfmError::data("bad field", Some("name".into())).http_status_code(),
            400
        );
        assert_eq!(
            DfmError::MissingImplementation {
                message: "x".into()
            }
            .http_status_code(),
            501
        );
        assert_eq!(DfmError::resource("redis down").http_status_code(), 503);
        assert_eq!(DfmError::server("invariant broken").http_status_code(), 500);
        assert_eq!(
            DfmError::Generic {
                message: "boom".into(),
                traceback: None
            }
            .http_status_code(),
            500
        );
    }

    #[test]
    fn core_error_converts_to_taxonomy() {
        let err: DfmError = Error::DeadlineMissingZone.into();
        assert_eq!(err.http_status_code(), 400);

        let err: DfmError = Error::EmptyBlockStack.into();
        assert_eq!(err.http_status_code(), 500);
    }
}
