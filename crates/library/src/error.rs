//! Library Error Types
//!
//! One taxonomy is shared by the synchronizer, the cover read-through and
//! ephemeral downloads, since all three fail in the same handful of ways:
//! the remote refused or could not be reached, the remote answered with
//! nothing, or the local disk let us down. A cache miss is not an error and
//! never appears here; it is an `Option::None`.

use crate::library::LibraryId;
use derive_more::{Display, Error};
use shelf_storage::error::Error as StorageError;
use std::fmt;
use std::path::PathBuf;

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A `stat` or `read` against the remote failed.
    #[display("{_0}")]
    RemoteUnavailable(#[error(not(source))] Failure),
    /// The remote claimed success but produced zero bytes.
    #[display("the remote returned no data for {_0}; the configured path is probably wrong")]
    RemoteDataInvalid(#[error(not(source))] String),
    /// Writing, renaming or deleting a local file failed. The device is
    /// likely full or the storage root unwritable.
    #[display("local storage error at {}", _0.display())]
    LocalStorage(#[error(not(source))] PathBuf),
    /// The local catalog replica could not be opened or queried.
    #[display("catalog replica could not be read")]
    Catalog,
    #[display("no library with id {_0}")]
    UnknownLibrary(#[error(not(source))] LibraryId),
    #[display("no item with id {_0} in the catalog")]
    UnknownItem(#[error(not(source))] i64),
    /// The item has no file in the requested format.
    #[display("item {_0} has no {_1} file")]
    UnknownFormat(#[error(not(source))] i64, #[error(not(source))] String),
    /// The library registry file is unreadable or corrupt.
    #[display("library registry at {} is corrupt", _0.display())]
    Registry(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Wrap a remote store error, keeping its tree as a child.
    ///
    /// `shared` tells whether the object was addressed through a shared link,
    /// which changes the advice given to the user.
    #[track_caller]
    pub fn remote(err: StorageError, shared: bool) -> Error {
        let failure = Failure::classify(&err, shared);
        err.raise(ErrorKind::RemoteUnavailable(failure))
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteUnavailable(Failure::Transient { .. }))
    }
}

/// What kind of remote failure the user is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// The object does not exist: the configured path is probably wrong.
    NotFound { shared: bool },
    /// The remote refused: a permission or sharing problem.
    AccessDenied { shared: bool },
    /// Anything else (network, throttling, server trouble); worth retrying.
    Transient { shared: bool },
}

impl Failure {
    pub fn classify(err: &StorageError, shared: bool) -> Self {
        if err.is_not_found() {
            Self::NotFound { shared }
        } else if err.is_access_denied() {
            Self::AccessDenied { shared }
        } else {
            Self::Transient { shared }
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { shared: false } => {
                f.write_str("not found on the remote; check the library path is correct")
            },
            Self::NotFound { shared: true } => f.write_str("not found in the shared folder; the link may be invalid or expired"),
            Self::AccessDenied { shared: false } => {
                f.write_str("access denied by the remote; check the folder's permissions and sharing settings")
            },
            Self::AccessDenied { shared: true } => {
                f.write_str("access to the shared folder was denied; the link may be invalid or expired")
            },
            Self::Transient { shared: false } => f.write_str("the remote could not be reached; try again later"),
            Self::Transient { shared: true } => {
                f.write_str("the shared folder could not be reached; the link may be invalid or expired, or try again later")
            },
        }
    }
}
