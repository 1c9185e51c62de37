//! Cache substrate errors.
//!
//! Per the platform's error handling policy, cache errors are swallowed at every
//! boundary by callers (read and write both degrade to "no cache" / "best effort"); this
//! enum exists so that degradation decision is explicit and logged rather than silent.

use thiserror::Error;

/// Result type used throughout `dfm-cache`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from the cache substrate. Every variant is recoverable by the caller
/// treating the cache as absent; none of these should ever fail a request.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Filesystem IO failure (missing directory, permission denied, disk full).
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),

    /// The sentinel or metadata file exists but failed to parse.
    #[error("cache metadata corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// The sentinel claims more elements were written than the adapter's loader
    /// could produce.
    #[error("cache sentinel claims {expected} elements but loader produced {actual}")]
    Truncated {
        /// Elements the sentinel claims.
        expected: usize,
        /// Elements the loader actually produced.
        actual: usize,
    },
}
