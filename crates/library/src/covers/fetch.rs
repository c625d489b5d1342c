use crate::covers::CoverCache;
use crate::error::{ErrorKind, Result};
use crate::library::Library;
use shelf_catalog::Item;
use shelf_storage::BackendHandle;

/// Get an item's cover, fetching and caching it on a miss.
///
/// Returns `None` for items without a cover. A hit never touches the
/// network; a miss costs one remote read. Remote and storage failures are
/// returned to the caller, who decides whether to show a placeholder.
pub async fn read_through(
    backend: &BackendHandle,
    covers: &CoverCache,
    library: &Library,
    item: &Item,
) -> Result<Option<Vec<u8>>> {
    if let Some(bytes) = covers.get(&library.id, item.id).await {
        return Ok(Some(bytes));
    }
    if !item.has_cover {
        return Ok(None);
    }
    let bytes = fetch_cover(backend, library, item).await?;
    covers.put(&library.id, item.id, &bytes).await?;
    Ok(Some(bytes))
}

/// Read an item's cover from the remote, rejecting an empty answer.
pub(crate) async fn fetch_cover(backend: &BackendHandle, library: &Library, item: &Item) -> Result<Vec<u8>> {
    let shared = library.is_shared();
    let location = library.cover_location(item).map_err(|err| ErrorKind::remote(err, shared))?;
    let bytes = backend.fetch(&location).await.map_err(|err| ErrorKind::remote(err, shared))?;
    if bytes.is_empty() {
        exn::bail!(ErrorKind::RemoteDataInvalid(location.to_string()));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Failure;
    use crate::layout::Layout;
    use crate::library::LibraryId;
    use shelf_storage::backend::MockBackend;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn item(id: i64, has_cover: bool) -> Item {
        Item {
            id,
            title: format!("Book {id}"),
            authors: Some("Author".to_string()),
            path: format!("Author/Book {id} ({id})"),
            has_cover,
            formats: vec![],
            description: None,
        }
    }

    fn setup(files: Vec<(&str, Vec<u8>)>) -> (TempDir, Arc<MockBackend>, CoverCache, Library) {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        layout.prepare().unwrap();
        let backend = Arc::new(MockBackend::with_files(files));
        let library = Library::new(LibraryId::new("a"), "/Calibre".parse().unwrap(), None);
        (dir, backend, CoverCache::new(layout), library)
    }

    #[tokio::test]
    async fn test_miss_fetches_and_stores() {
        let cover = vec![7u8; 2048];
        let (_dir, backend, covers, library) = setup(vec![("/Calibre/Author/Book 1 (1)/cover.jpg", cover.clone())]);
        let handle: BackendHandle = backend.clone();
        let item = item(1, true);

        assert_eq!(covers.get(&library.id, item.id).await, None);
        let fetched = read_through(&handle, &covers, &library, &item).await.unwrap();
        assert_eq!(fetched.as_deref().map(<[u8]>::len), Some(2048));
        assert_eq!(covers.get(&library.id, item.id).await, Some(cover.clone()));

        // A hit does not go back to the remote.
        assert_eq!(read_through(&handle, &covers, &library, &item).await.unwrap(), Some(cover));
        assert_eq!(backend.read_count(), 1);
    }

    #[tokio::test]
    async fn test_item_without_cover() {
        let (_dir, backend, covers, library) = setup(vec![]);
        let handle: BackendHandle = backend.clone();
        assert_eq!(read_through(&handle, &covers, &library, &item(1, false)).await.unwrap(), None);
        assert_eq!(backend.read_count(), 0);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let (_dir, backend, covers, library) = setup(vec![("/Calibre/Author/Book 2 (2)/cover.jpg", vec![])]);
        let handle: BackendHandle = backend.clone();

        let err = read_through(&handle, &covers, &library, &item(1, true)).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::RemoteUnavailable(Failure::NotFound { .. })));
        let err = read_through(&handle, &covers, &library, &item(2, true)).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::RemoteDataInvalid(_)));
        assert_eq!(covers.get(&library.id, 2).await, None);
    }
}
