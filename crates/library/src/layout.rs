//! On-disk layout of the private storage root.
//!
//! ```text
//! <root>/
//!   libraries.json                  registry
//!   catalogs/metadata_<key>.db      one replica per library
//!   covers/<key>/<item id>.jpg      one namespace per library
//!   downloads/temp_*                ephemeral downloads
//! ```
//!
//! Every name is derived from ids alone; there is no index to fall out of
//! sync with the files. In-progress writes carry a `.part` suffix and are
//! renamed into place once complete.

use crate::error::{ErrorKind, Result};
use crate::library::LibraryId;
use exn::ResultExt;
use shelf_catalog::ItemId;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

/// Suffix of files still being written.
pub const PART_SUFFIX: &str = ".part";

const REGISTRY_FILE: &str = "libraries.json";
const CATALOGS_DIR: &str = "catalogs";
const COVERS_DIR: &str = "covers";
const DOWNLOADS_DIR: &str = "downloads";

#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registry_path(&self) -> PathBuf {
        self.root.join(REGISTRY_FILE)
    }

    pub fn catalogs_dir(&self) -> PathBuf {
        self.root.join(CATALOGS_DIR)
    }

    pub fn catalog_path(&self, library: &LibraryId) -> PathBuf {
        self.catalogs_dir().join(format!("metadata_{}.db", library.storage_key()))
    }

    pub fn covers_dir(&self) -> PathBuf {
        self.root.join(COVERS_DIR)
    }

    pub fn cover_namespace(&self, library: &LibraryId) -> PathBuf {
        self.covers_dir().join(library.storage_key())
    }

    pub fn cover_path(&self, library: &LibraryId, item: ItemId) -> PathBuf {
        self.cover_namespace(library).join(format!("{item}.jpg"))
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join(DOWNLOADS_DIR)
    }

    /// Create the directory tree and remove `.part` files left behind by
    /// writes that never completed.
    pub fn prepare(&self) -> Result<usize> {
        for dir in [self.catalogs_dir(), self.covers_dir(), self.downloads_dir()] {
            std::fs::create_dir_all(&dir).or_raise(|| ErrorKind::LocalStorage(dir.clone()))?;
        }
        let mut removed = remove_partial_files(&self.catalogs_dir())?;
        let namespaces = std::fs::read_dir(self.covers_dir()).or_raise(|| ErrorKind::LocalStorage(self.covers_dir()))?;
        for entry in namespaces.flatten() {
            if entry.file_type().is_ok_and(|t| t.is_dir()) {
                removed += remove_partial_files(&entry.path())?;
            }
        }
        if removed > 0 {
            tracing::info!(removed, "Removed incomplete files from an earlier run");
        }
        Ok(removed)
    }
}

/// Remove a file, treating "already gone" as success.
pub(crate) async fn remove_file_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(err) if err.kind() != IoErrorKind::NotFound => Err(err).or_raise(|| ErrorKind::LocalStorage(path.to_path_buf())),
        _ => Ok(()),
    }
}

/// Remove a directory tree, treating "already gone" as success.
pub(crate) async fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(err) if err.kind() != IoErrorKind::NotFound => Err(err).or_raise(|| ErrorKind::LocalStorage(path.to_path_buf())),
        _ => Ok(()),
    }
}

fn remove_partial_files(dir: &Path) -> Result<usize> {
    let mut removed = 0;
    let entries = std::fs::read_dir(dir).or_raise(|| ErrorKind::LocalStorage(dir.to_path_buf()))?;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.file_name().is_some_and(|name| name.to_string_lossy().ends_with(PART_SUFFIX)) {
            continue;
        }
        match std::fs::remove_file(&path) {
            Err(err) if err.kind() != IoErrorKind::NotFound => {
                return Err(err).or_raise(|| ErrorKind::LocalStorage(path.clone()));
            },
            _ => removed += 1,
        }
    }
    Ok(removed)
}
