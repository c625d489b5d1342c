//! Remote store trait and implementations.
//!
//! This module defines the [`StorageBackend`] trait, the narrow interface the
//! cache engine consumes from whatever transport actually talks to the remote
//! (authentication, retries and back-off are the transport's business).

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
use crate::error::{ErrorKind, Result};
use crate::file::FileInfo;
use crate::location::Location;
use async_trait::async_trait;
use std::path::Path;
use tokio::io::AsyncWrite;

/// Destination for streamed object contents.
pub type Sink<'a> = dyn AsyncWrite + Send + Unpin + 'a;

/// Unified interface for remote stores.
///
/// Objects are addressed either by absolute remote path, or by a shared link
/// plus a path relative to the linked folder. Every method may suspend on
/// network I/O; none of them has a caller-facing timeout.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// # use shelf_storage::{backend::StorageBackend, error::{ErrorKind, Result}};
/// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
/// let info = backend.stat(Path::new("/Calibre Library/metadata.db")).await?;
/// let mut file = tokio::fs::File::create("/tmp/metadata.db").await.map_err(ErrorKind::Io)?;
/// let written = backend.read_into(Path::new("/Calibre Library/metadata.db"), &mut file).await?;
/// assert_eq!(written, info.size);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend (logging only).
    fn name(&self) -> &str;

    /// Get object metadata without reading contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the object
    /// does not exist.
    async fn stat(&self, path: &Path) -> Result<FileInfo>;

    /// Get metadata of an object inside a shared folder.
    ///
    /// Not every remote can answer this; the default implementation reports
    /// a [`BackendError`](crate::error::ErrorKind::BackendError).
    async fn stat_shared(&self, link: &str, _path: &Path) -> Result<FileInfo> {
        exn::bail!(ErrorKind::BackendError(format!("`{}` cannot stat inside shared link {link}", self.name())))
    }

    /// Stream an object into `sink`, returning the number of bytes written.
    ///
    /// The sink is not flushed; that is left to the caller who owns it.
    async fn read_into(&self, path: &Path, sink: &mut Sink<'_>) -> Result<u64>;

    /// Stream an object addressed relative to a shared link into `sink`.
    async fn read_shared_into(&self, link: &str, path: &Path, sink: &mut Sink<'_>) -> Result<u64>;

    /// Read a whole object into memory.
    ///
    /// Default implementation collects [`read_into()`](Self::read_into)
    /// into a [`Vec`].
    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.read_into(path, &mut buffer).await?;
        Ok(buffer)
    }

    /// Get metadata for either addressing mode.
    async fn stat_at(&self, location: &Location) -> Result<FileInfo> {
        match location {
            Location::Path(path) => self.stat(path).await,
            Location::Shared { link, path } => self.stat_shared(link, path).await,
        }
    }

    /// Stream an object from either addressing mode into `sink`.
    async fn read_at(&self, location: &Location, sink: &mut Sink<'_>) -> Result<u64> {
        match location {
            Location::Path(path) => self.read_into(path, sink).await,
            Location::Shared { link, path } => self.read_shared_into(link, path, sink).await,
        }
    }

    /// Read a whole object from either addressing mode into memory.
    async fn fetch(&self, location: &Location) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.read_at(location, &mut buffer).await?;
        Ok(buffer)
    }
}
