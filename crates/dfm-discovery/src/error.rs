//! Errors raised while walking an already-built advice tree.

use thiserror::Error;

/// Result type used throughout `dfm-discovery`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from selecting a value against a [`crate::advice::FieldAdvice`] tree.
#[derive(Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The selected value does not match any branch at this node.
    #[error("value does not match any advised branch")]
    NoSuchBranch,

    /// The path led to an error edge. Carries the advisor's message.
    #[error("advised value rejected: {0}")]
    Advised(String),

    /// The path led to a partial edge: the client must commit to values chosen so
    /// far and start a fresh discovery pass for the remaining fields.
    #[error("advice tree truncated at this point, start a new discovery pass")]
    Partial,
}
