//! Remote object metadata.

use std::path::PathBuf;
use time::UtcDateTime;

/// Metadata returned by [`stat`](crate::StorageBackend::stat).
///
/// Only size and modification time are exposed; that is all the staleness
/// check of a catalog replica needs, and all every remote can cheaply answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Path as it was requested from the backend.
    pub path: PathBuf,
    /// Object size in bytes.
    pub size: u64,
    /// Server-side modification time.
    pub modified: UtcDateTime,
}
impl FileInfo {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: impl Into<UtcDateTime>) -> Self {
        Self {
            path: path.into(),
            size,
            modified: modified.into(),
        }
    }
}
