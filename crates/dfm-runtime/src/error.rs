//! Errors internal to this crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The stream's producer task raised an exception; it poisons every consumer
    /// touching the slot at or after the point of failure.
    #[error("stream producer failed: {0}")]
    Producer(String),

    /// A consumer tried to advance past a cancelled stream.
    #[error("stream was cancelled")]
    Cancelled,

    /// An upstream adapter referenced by a Unary/BinaryZip body was never bound.
    #[error("adapter has no input bound under name {0:?}")]
    UnboundInput(String),

    /// The cache substrate failed; per the cache-errors-are-swallowed policy this
    /// variant should never surface past `get_or_create_stream` — it exists so
    /// internal helpers have something to log before falling back.
    #[error("cache error: {0}")]
    Cache(#[from] dfm_cache::Error),
}

impl From<Error> for dfm_core::DfmError {
    fn from(e: Error) -> Self {
        match e {
            Error::Producer(_) => dfm_core::DfmError::server(e.to_string()),
            Error::Cancelled => dfm_core::DfmError::server(e.to_string()),
            Error::UnboundInput(_) => dfm_core::DfmError::data(e.to_string(), None),
            Error::Cache(_) => dfm_core::DfmError::resource(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbound_input_is_a_data_error() {
        let err: dfm_core::DfmError = Error::UnboundInput("left".to_string()).into();
        assert_eq!(err.http_status_code(), 400);
    }

    #[test]
    fn producer_failure_is_a_server_error() {
        let err: dfm_core::DfmError = Error::Producer("boom".to_string()).into();
        assert_eq!(err.http_status_code(), 500);
    }
}
