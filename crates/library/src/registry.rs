//! The set of configured libraries and the current selection.
//!
//! Pure data access: nothing here touches the remote or the caches. The
//! registry is persisted as a single JSON document, rewritten atomically on
//! every mutation before the mutating call returns.

use crate::error::{ErrorKind, Result};
use crate::library::{Library, LibraryId};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct State {
    /// In insertion order.
    libraries: Vec<Library>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    current: Option<LibraryId>,
}

impl State {
    fn position(&self, id: &LibraryId) -> Option<usize> {
        self.libraries.iter().position(|library| &library.id == id)
    }

    fn default_library(&self) -> Option<&Library> {
        self.libraries.iter().find(|library| library.is_default).or_else(|| self.libraries.first())
    }

    fn make_default(&mut self, id: &LibraryId) {
        for library in &mut self.libraries {
            library.is_default = &library.id == id;
        }
    }
}

/// Persistent registry of libraries.
///
/// At most one library is flagged default. When no library has been made
/// current, the default one (or else the first added) stands in.
#[derive(Debug)]
pub struct Registry {
    path: PathBuf,
    state: Mutex<State>,
}

impl Registry {
    /// Load the registry from `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).or_raise(|| ErrorKind::Registry(path.clone()))?,
            Err(err) if err.kind() == IoErrorKind::NotFound => State::default(),
            Err(err) => return Err(err).or_raise(|| ErrorKind::LocalStorage(path.clone())),
        };
        Ok(Self { path, state: Mutex::new(state) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // A panic while holding the lock cannot leave the state half-mutated:
    // every mutation works on a copy that is only swapped in once persisted.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All libraries, in insertion order.
    pub fn list(&self) -> Vec<Library> {
        self.lock().libraries.clone()
    }

    pub fn get(&self, id: &LibraryId) -> Option<Library> {
        let state = self.lock();
        state.position(id).map(|index| state.libraries[index].clone())
    }

    /// Add a library. Returns `false`, changing nothing, if another library
    /// already points at the same remote folder (or uses the same id).
    ///
    /// The first library added becomes the default; adding a library flagged
    /// default takes the flag from whichever library had it.
    pub fn add(&self, library: Library) -> Result<bool> {
        let mut state = self.lock();
        if state.libraries.iter().any(|existing| existing.same_location(&library) || existing.id == library.id) {
            return Ok(false);
        }
        let mut next = state.clone();
        let id = library.id.clone();
        let is_default = library.is_default || next.libraries.is_empty();
        next.libraries.push(library);
        if is_default {
            next.make_default(&id);
        }
        self.commit(&mut state, next)?;
        tracing::info!(library = %id, "Added library");
        Ok(true)
    }

    /// Remove a library. Returns `false` if the id is unknown.
    ///
    /// Removing the default promotes the first remaining library; removing the
    /// current library makes the (possibly new) default current.
    pub fn remove(&self, id: &LibraryId) -> Result<bool> {
        let mut state = self.lock();
        let Some(index) = state.position(id) else {
            return Ok(false);
        };
        let mut next = state.clone();
        let removed = next.libraries.remove(index);
        if removed.is_default
            && let Some(promoted) = next.libraries.first().map(|library| library.id.clone())
        {
            next.make_default(&promoted);
        }
        if next.current.as_ref() == Some(id) {
            next.current = next.default_library().map(|library| library.id.clone());
        }
        self.commit(&mut state, next)?;
        tracing::info!(library = %id, "Removed library");
        Ok(true)
    }

    /// Replace a library's name, root or default flag. Returns `false`,
    /// changing nothing, if the id is unknown or another library already
    /// points at the new location.
    pub fn update(&self, library: Library) -> Result<bool> {
        let mut state = self.lock();
        let Some(index) = state.position(&library.id) else {
            return Ok(false);
        };
        if state.libraries.iter().any(|existing| existing.id != library.id && existing.same_location(&library)) {
            return Ok(false);
        }
        let mut next = state.clone();
        let id = library.id.clone();
        let is_default = library.is_default;
        next.libraries[index] = library;
        if is_default {
            next.make_default(&id);
        }
        self.commit(&mut state, next)?;
        Ok(true)
    }

    /// Make `id` the current library. Returns `false` if the id is unknown.
    pub fn set_current(&self, id: &LibraryId) -> Result<bool> {
        let mut state = self.lock();
        if state.position(id).is_none() {
            return Ok(false);
        }
        let mut next = state.clone();
        next.current = Some(id.clone());
        self.commit(&mut state, next)?;
        Ok(true)
    }

    /// The current library, falling back to the default, then the first added.
    pub fn current(&self) -> Option<Library> {
        let state = self.lock();
        state
            .current
            .as_ref()
            .and_then(|id| state.position(id))
            .map(|index| &state.libraries[index])
            .or_else(|| state.default_library())
            .cloned()
    }

    /// Persist `next`, then swap it in. On failure the in-memory state is
    /// left as it was.
    fn commit(&self, state: &mut State, next: State) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&next).or_raise(|| ErrorKind::Registry(self.path.clone()))?;
        let failed = || ErrorKind::LocalStorage(self.path.clone());
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).or_raise(failed)?;
        let mut temp = tempfile::Builder::new().suffix(crate::layout::PART_SUFFIX).tempfile_in(dir).or_raise(failed)?;
        temp.write_all(&bytes).or_raise(failed)?;
        temp.as_file().sync_all().or_raise(failed)?;
        temp.persist(&self.path).or_raise(failed)?;
        *state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_storage::RemoteRoot;
    use tempfile::TempDir;

    fn library(id: &str, root: &str) -> Library {
        Library::new(LibraryId::new(id), root.parse::<RemoteRoot>().unwrap(), None)
    }

    fn registry() -> (TempDir, Registry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(dir.path().join("libraries.json")).unwrap();
        (dir, registry)
    }

    fn defaults(registry: &Registry) -> Vec<String> {
        registry.list().into_iter().filter(|l| l.is_default).map(|l| l.id.to_string()).collect()
    }

    #[test]
    fn test_first_library_becomes_default() {
        let (_dir, registry) = registry();
        assert!(registry.add(library("a", "/A")).unwrap());
        assert!(registry.add(library("b", "/B")).unwrap());
        assert_eq!(defaults(&registry), ["a"]);
        assert_eq!(registry.current().unwrap().id.as_str(), "a");
    }

    #[test]
    fn test_duplicate_root_is_rejected() {
        let (_dir, registry) = registry();
        assert!(registry.add(library("a", "/Calibre")).unwrap());
        assert!(!registry.add(library("b", "/Calibre")).unwrap());
        assert!(!registry.add(library("a", "/Other")).unwrap());
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn test_adding_default_moves_flag() {
        let (_dir, registry) = registry();
        registry.add(library("a", "/A")).unwrap();
        let mut b = library("b", "/B");
        b.is_default = true;
        registry.add(b).unwrap();
        assert_eq!(defaults(&registry), ["b"]);
    }

    #[test]
    fn test_remove_default_promotes_and_resets_current() {
        let (_dir, registry) = registry();
        registry.add(library("a", "/A")).unwrap();
        registry.add(library("b", "/B")).unwrap();
        registry.add(library("c", "/C")).unwrap();
        assert!(registry.set_current(&LibraryId::new("a")).unwrap());

        assert!(registry.remove(&LibraryId::new("a")).unwrap());
        assert_eq!(defaults(&registry), ["b"]);
        assert_eq!(registry.current().unwrap().id.as_str(), "b");
        assert!(!registry.remove(&LibraryId::new("a")).unwrap());
    }

    #[test]
    fn test_remove_non_current_keeps_current() {
        let (_dir, registry) = registry();
        registry.add(library("a", "/A")).unwrap();
        registry.add(library("b", "/B")).unwrap();
        registry.set_current(&LibraryId::new("b")).unwrap();
        registry.remove(&LibraryId::new("a")).unwrap();
        assert_eq!(registry.current().unwrap().id.as_str(), "b");
        assert_eq!(defaults(&registry), ["b"]);
    }

    #[test]
    fn test_update() {
        let (_dir, registry) = registry();
        registry.add(library("a", "/A")).unwrap();
        registry.add(library("b", "/B")).unwrap();
        let mut renamed = registry.get(&LibraryId::new("b")).unwrap();
        renamed.name = "Fiction".to_string();
        renamed.is_default = true;
        assert!(registry.update(renamed).unwrap());
        assert_eq!(registry.get(&LibraryId::new("b")).unwrap().name, "Fiction");
        assert_eq!(defaults(&registry), ["b"]);
        assert!(!registry.update(library("zzz", "/Z")).unwrap());
    }

    #[test]
    fn test_update_to_taken_location_is_rejected() {
        let (_dir, registry) = registry();
        registry.add(library("a", "/A")).unwrap();
        registry.add(library("b", "/B")).unwrap();
        let mut moved = registry.get(&LibraryId::new("b")).unwrap();
        moved.remote_root = "/A".into();
        assert!(!registry.update(moved.clone()).unwrap());
        assert_eq!(registry.get(&LibraryId::new("b")).unwrap().remote_root, Path::new("/B"));

        moved.remote_root = "/C".into();
        assert!(registry.update(moved).unwrap());
        assert_eq!(registry.get(&LibraryId::new("b")).unwrap().remote_root, Path::new("/C"));
    }

    #[test]
    fn test_unknown_current_is_rejected() {
        let (_dir, registry) = registry();
        assert!(registry.current().is_none());
        assert!(!registry.set_current(&LibraryId::new("nope")).unwrap());
    }

    #[test]
    fn test_mutations_are_durable() {
        let (dir, registry) = registry();
        registry.add(library("a", "/A")).unwrap();
        registry.add(library("b", "https://www.dropbox.com/scl/fo/xyz?rlkey=1")).unwrap();
        registry.set_current(&LibraryId::new("b")).unwrap();
        drop(registry);

        let reopened = Registry::open(dir.path().join("libraries.json")).unwrap();
        let ids = reopened.list().into_iter().map(|l| l.id.to_string()).collect::<Vec<_>>();
        assert_eq!(ids, ["a", "b"]);
        let current = reopened.current().unwrap();
        assert_eq!(current.id.as_str(), "b");
        assert!(current.is_shared());
    }

    #[test]
    fn test_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libraries.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let err = Registry::open(&path).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Registry(_)));
    }
}
