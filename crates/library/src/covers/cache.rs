use crate::error::{ErrorKind, Result};
use crate::layout::{Layout, PART_SUFFIX, remove_dir_if_exists};
use crate::library::LibraryId;
use exn::ResultExt;
use shelf_catalog::ItemId;
use std::io::ErrorKind as IoErrorKind;
use tokio::io::AsyncWriteExt;

/// Local store of cover images keyed by `(library, item)`.
#[derive(Debug, Clone)]
pub struct CoverCache {
    layout: Layout,
}

impl CoverCache {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    /// Cached cover bytes, or `None` on a miss.
    ///
    /// Never touches the network. An unreadable or empty file is logged and
    /// reported as a miss: a broken cover degrades to a placeholder.
    pub async fn get(&self, library: &LibraryId, item: ItemId) -> Option<Vec<u8>> {
        let path = self.layout.cover_path(library, item);
        match tokio::fs::read(&path).await {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => {
                tracing::warn!(library = %library, item, "Ignoring empty cached cover");
                None
            },
            Err(err) if err.kind() == IoErrorKind::NotFound => None,
            Err(err) => {
                tracing::warn!(library = %library, item, error = %err, "Could not read cached cover");
                None
            },
        }
    }

    /// Whether a cover is cached, without reading it.
    pub async fn contains(&self, library: &LibraryId, item: ItemId) -> bool {
        let path = self.layout.cover_path(library, item);
        tokio::fs::metadata(&path).await.is_ok_and(|metadata| metadata.is_file() && metadata.len() > 0)
    }

    /// Store a cover.
    ///
    /// The bytes are written to a temporary file in the same namespace and
    /// renamed over the final name. Readers see the old file or the new one;
    /// with two concurrent puts for one key, the last rename wins.
    pub async fn put(&self, library: &LibraryId, item: ItemId, bytes: &[u8]) -> Result<()> {
        let dir = self.layout.cover_namespace(library);
        let path = self.layout.cover_path(library, item);
        let failed = || ErrorKind::LocalStorage(path.clone());
        tokio::fs::create_dir_all(&dir).await.or_raise(failed)?;
        let temp = tempfile::Builder::new()
            .prefix(&format!(".{item}_"))
            .suffix(PART_SUFFIX)
            .tempfile_in(&dir)
            .or_raise(failed)?;
        let mut file = tokio::fs::File::from_std(temp.reopen().or_raise(failed)?);
        file.write_all(bytes).await.or_raise(failed)?;
        file.flush().await.or_raise(failed)?;
        drop(file);
        temp.persist(&path).or_raise(failed)?;
        tracing::trace!(library = %library, item, bytes = bytes.len(), "Stored cover");
        Ok(())
    }

    /// Delete the covers of one library, or of every library.
    pub async fn clear(&self, library: Option<&LibraryId>) -> Result<()> {
        match library {
            Some(id) => remove_dir_if_exists(&self.layout.cover_namespace(id)).await?,
            None => {
                remove_dir_if_exists(&self.layout.covers_dir()).await?;
                let dir = self.layout.covers_dir();
                tokio::fs::create_dir_all(&dir).await.or_raise(|| ErrorKind::LocalStorage(dir.clone()))?;
            },
        }
        tracing::info!(library = ?library.map(LibraryId::as_str), "Cleared cover cache");
        Ok(())
    }
}
