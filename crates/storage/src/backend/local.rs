//! Local filesystem storage backend.
//!
//! Treats a directory on disk as the remote: handy when the remote folder is
//! already mirrored by a desktop sync client, and for exercising the engine
//! against real files. Shared links are registered up front and map onto
//! folders below the root.

use crate::backend::Sink;
use crate::error::{ErrorKind, Result};
use crate::{FileInfo, StorageBackend, path::validate as validate_path};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Local filesystem storage backend.
///
/// # Examples
///
/// ```no_run
/// use shelf_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("dropbox-mirror", "/home/me/Dropbox")?
///     .with_shared_link("https://www.dropbox.com/scl/fo/xyz", "Shared/Calibre");
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct LocalBackend {
    name: String,
    /// Directory standing in for the top of the remote.
    root: PathBuf,
    /// Shared link token to folder (relative to `root`).
    links: HashMap<String, PathBuf>,
}
impl LocalBackend {
    /// Create a new local filesystem backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute or is not a directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() || !root.is_dir() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        Ok(Self {
            name: name.into(),
            root,
            links: HashMap::new(),
        })
    }

    /// Register a shared link resolving to `folder` below the root.
    pub fn with_shared_link(mut self, link: impl Into<String>, folder: impl Into<PathBuf>) -> Self {
        self.links.insert(link.into(), folder.into());
        self
    }

    fn absolute_path(&self, path: &Path) -> Result<PathBuf> {
        Ok(self.root.join(validate_path(path)?))
    }

    fn shared_path(&self, link: &str, path: &Path) -> Result<PathBuf> {
        let folder = self.links.get(link).ok_or_else(|| ErrorKind::InvalidLink(link.to_string()))?;
        Ok(self.root.join(validate_path(folder)?).join(validate_path(path)?))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    async fn stat_absolute(requested: &Path, absolute: &Path) -> Result<FileInfo> {
        let metadata = fs::metadata(absolute).await.map_err(|e| Self::map_io_error(e, requested))?;
        if !metadata.is_file() {
            exn::bail!(ErrorKind::NotFound(requested.to_path_buf()));
        }
        let modified = metadata.modified().map_err(ErrorKind::Io)?;
        Ok(FileInfo::new(requested, metadata.len(), modified))
    }

    async fn copy_absolute(requested: &Path, absolute: &Path, sink: &mut Sink<'_>) -> Result<u64> {
        let mut file = fs::File::open(absolute).await.map_err(|e| Self::map_io_error(e, requested))?;
        Ok(tokio::io::copy(&mut file, sink).await.map_err(ErrorKind::Io)?)
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        Self::stat_absolute(path, &self.absolute_path(path)?).await
    }

    async fn stat_shared(&self, link: &str, path: &Path) -> Result<FileInfo> {
        Self::stat_absolute(path, &self.shared_path(link, path)?).await
    }

    async fn read_into(&self, path: &Path, sink: &mut Sink<'_>) -> Result<u64> {
        Self::copy_absolute(path, &self.absolute_path(path)?, sink).await
    }

    async fn read_shared_into(&self, link: &str, path: &Path, sink: &mut Sink<'_>) -> Result<u64> {
        Self::copy_absolute(path, &self.shared_path(link, path)?, sink).await
    }
}
