//! Catalog Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A catalog error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The file could not be opened as a catalog (missing, truncated, not SQLite).
    #[display("cannot open catalog replica: {}", _0.display())]
    Open(#[error(not(source))] PathBuf),
    #[display("database error")]
    Database,
    /// A row held a value that does not fit the model.
    #[display("invalid catalog data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// A replica is immutable once published; asking again gives the same answer.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
