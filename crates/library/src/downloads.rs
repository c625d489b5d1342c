//! Ephemeral downloads of item content files.
//!
//! Opening or sharing a book needs the actual file on local disk. Those
//! copies are not part of the durable cache: they land in a flat scratch
//! directory and the [`Janitor`](crate::janitor::Janitor) deletes them once
//! they have gone unused for long enough.

use crate::error::{ErrorKind, Result};
use crate::layout::{Layout, PART_SUFFIX};
use crate::library::Library;
use exn::ResultExt;
use shelf_catalog::{Format, Item};
use shelf_storage::BackendHandle;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::io::AsyncWriteExt;
use tracing::instrument;

/// Fetches content files into the scratch directory on demand.
#[derive(Clone)]
pub struct Downloads {
    backend: BackendHandle,
    dir: PathBuf,
}

impl Downloads {
    pub fn new(backend: BackendHandle, layout: &Layout) -> Self {
        Self { backend, dir: layout.downloads_dir() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Local name of a content file: `temp_<library>_<item>_<name>.<ext>`.
    ///
    /// Derived only from the file's identity, so asking twice for the same
    /// file finds the earlier copy.
    pub fn file_name(library: &Library, item: &Item, format: &Format) -> String {
        let name = format.name.replace(['/', '\\'], "_");
        format!("temp_{}_{}_{name}.{}", library.id.storage_key(), item.id, format.extension())
    }

    /// Make `format` of `item` available locally and return its path.
    ///
    /// An existing non-empty copy is reused, and its modification time is
    /// bumped so that expiry counts from the last time it was opened.
    #[instrument("opening content file", skip_all, fields(library = %library.id, item = item.id, format))]
    pub async fn open(&self, library: &Library, item: &Item, format: &str) -> Result<PathBuf> {
        let format = item.format(format).ok_or_else(|| ErrorKind::UnknownFormat(item.id, format.to_string()))?;
        let path = self.dir.join(Self::file_name(library, item, format));
        if reuse(&path).await? {
            tracing::debug!(path = %path.display(), "Reusing downloaded file");
            return Ok(path);
        }

        let shared = library.is_shared();
        let location = library.format_location(item, format).map_err(|err| ErrorKind::remote(err, shared))?;
        let failed = || ErrorKind::LocalStorage(path.clone());
        tokio::fs::create_dir_all(&self.dir).await.or_raise(failed)?;
        let temp = tempfile::Builder::new().prefix(".temp_").suffix(PART_SUFFIX).tempfile_in(&self.dir).or_raise(failed)?;
        let mut file = tokio::fs::File::from_std(temp.reopen().or_raise(failed)?);
        let written = self.backend.read_at(&location, &mut file).await.map_err(|err| ErrorKind::remote(err, shared))?;
        file.flush().await.or_raise(failed)?;
        if written == 0 {
            exn::bail!(ErrorKind::RemoteDataInvalid(location.to_string()));
        }
        temp.persist(&path).or_raise(failed)?;
        tracing::info!(path = %path.display(), bytes = written, "Downloaded content file");
        Ok(path)
    }
}

/// Whether a usable copy already exists; touches it if so.
async fn reuse(path: &Path) -> Result<bool> {
    let failed = || ErrorKind::LocalStorage(path.to_path_buf());
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() && metadata.len() > 0 => {
            let file = tokio::fs::OpenOptions::new().write(true).open(path).await.or_raise(failed)?;
            file.into_std().await.set_modified(SystemTime::now()).or_raise(failed)?;
            Ok(true)
        },
        Ok(_) => Ok(false),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err).or_raise(failed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Failure;
    use crate::library::LibraryId;
    use shelf_storage::backend::MockBackend;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    const EPUB: &str = "/Calibre/Frank Herbert/Dune (1)/Dune - Frank Herbert.epub";

    fn item() -> Item {
        Item {
            id: 1,
            title: "Dune".to_string(),
            authors: Some("Frank Herbert".to_string()),
            path: "Frank Herbert/Dune (1)".to_string(),
            has_cover: false,
            formats: vec![
                Format { format: "EPUB".to_string(), name: "Dune - Frank Herbert".to_string(), size: 9 },
                Format { format: "PDF".to_string(), name: "Dune - Frank Herbert".to_string(), size: 9 },
            ],
            description: None,
        }
    }

    fn setup(files: Vec<(&str, Vec<u8>)>) -> (TempDir, Arc<MockBackend>, Downloads, Library) {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        layout.prepare().unwrap();
        let backend = Arc::new(MockBackend::with_files(files));
        let downloads = Downloads::new(backend.clone(), &layout);
        let library = Library::new(LibraryId::new("a"), "/Calibre".parse().unwrap(), None);
        (dir, backend, downloads, library)
    }

    #[tokio::test]
    async fn test_open_downloads_then_reuses() {
        let (_dir, backend, downloads, library) = setup(vec![(EPUB, b"epub data".to_vec())]);
        let path = downloads.open(&library, &item(), "epub").await.unwrap();
        assert_eq!(path.file_name().unwrap(), "temp_a_1_Dune - Frank Herbert.epub");
        assert_eq!(std::fs::read(&path).unwrap(), b"epub data");

        // Age the copy; opening it again refreshes its modification time.
        let old = SystemTime::now() - Duration::from_secs(3600);
        std::fs::File::options().write(true).open(&path).unwrap().set_modified(old).unwrap();
        let again = downloads.open(&library, &item(), "EPUB").await.unwrap();
        assert_eq!(again, path);
        assert_eq!(backend.read_count(), 1);
        assert!(std::fs::metadata(&path).unwrap().modified().unwrap() > old);
    }

    #[tokio::test]
    async fn test_unknown_format() {
        let (_dir, _backend, downloads, library) = setup(vec![]);
        let err = downloads.open(&library, &item(), "mobi").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnknownFormat(1, _)));
    }

    #[tokio::test]
    async fn test_failures_leave_nothing_behind() {
        let pdf = "/Calibre/Frank Herbert/Dune (1)/Dune - Frank Herbert.pdf";
        let (_dir, _backend, downloads, library) = setup(vec![(pdf, vec![])]);
        let err = downloads.open(&library, &item(), "epub").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::RemoteUnavailable(Failure::NotFound { .. })));
        let err = downloads.open(&library, &item(), "pdf").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::RemoteDataInvalid(_)));
        assert_eq!(std::fs::read_dir(downloads.dir()).unwrap().count(), 0);
    }
}
