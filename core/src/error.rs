//! Errors produced while parsing a response head.

use thiserror::Error;

/// The status line of a response could not be read.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeadError {
    /// The head was empty or its first line had no version token.
    #[error("cannot parse header: missing status line")]
    MissingStatusLine,

    /// The token after the version was not a number.
    #[error("cannot parse header: invalid status code [{0}]")]
    InvalidStatusCode(String),
}
