//! The library model.

use serde::{Deserialize, Serialize};
use shelf_catalog::{CATALOG_FILE, Format, Item};
use shelf_storage::error::Result as StorageResult;
use shelf_storage::{Location, RemoteRoot};
use std::fmt;
use std::path::PathBuf;

/// Longest id used verbatim as a file name component.
const MAX_KEY_LENGTH: usize = 64;

/// Opaque library identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LibraryId(String);

impl LibraryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name used for every local file belonging to this library.
    ///
    /// Ids made of ASCII letters, digits, `-` and `_` are used as-is. Anything
    /// else (or anything too long) is replaced by `~` and a BLAKE3 digest of
    /// the id, so that two different ids never share a key and no id can
    /// produce a path separator. The `~` cannot appear in a verbatim key.
    pub fn storage_key(&self) -> String {
        let verbatim = !self.0.is_empty()
            && self.0.len() <= MAX_KEY_LENGTH
            && self.0.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        match verbatim {
            true => self.0.clone(),
            false => format!("~{}", &blake3::hash(self.0.as_bytes()).to_hex()[..32]),
        }
    }
}

impl fmt::Display for LibraryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LibraryId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// An independently configured remote folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    pub id: LibraryId,
    pub name: String,
    /// Absolute folder path on the remote. `/` for libraries reached through
    /// a shared link, where the link alone identifies the folder.
    pub remote_root: PathBuf,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_link: Option<String>,
}

impl Library {
    /// Describe a new library at `root`, named after its folder unless a name
    /// is given.
    pub fn new(id: LibraryId, root: RemoteRoot, name: Option<String>) -> Self {
        let name = name.filter(|n| !n.trim().is_empty()).unwrap_or_else(|| root.display_name());
        let (remote_root, shared_link) = match root {
            RemoteRoot::Path(path) => (path, None),
            RemoteRoot::SharedLink(link) => (PathBuf::from("/"), Some(link)),
        };
        Self {
            id,
            name,
            remote_root,
            is_default: false,
            shared_link,
        }
    }

    pub fn is_shared(&self) -> bool {
        self.shared_link.is_some()
    }

    /// Whether both libraries point at the same remote folder.
    pub fn same_location(&self, other: &Self) -> bool {
        self.remote_root == other.remote_root && self.shared_link == other.shared_link
    }

    /// Where the catalog lives: `/<root>/metadata.db`, or `metadata.db`
    /// inside the shared folder.
    pub fn catalog_location(&self) -> StorageResult<Location> {
        self.locate(CATALOG_FILE)
    }

    pub fn cover_location(&self, item: &Item) -> StorageResult<Location> {
        self.locate(item.cover_path())
    }

    pub fn format_location(&self, item: &Item, format: &Format) -> StorageResult<Location> {
        self.locate(item.format_path(format))
    }

    fn locate(&self, relative: impl Into<PathBuf>) -> StorageResult<Location> {
        Location::resolve(&self.remote_root, self.shared_link.as_deref(), relative.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::path::Path;

    #[rstest]
    #[case("work", "work")]
    #[case("3f2a9c0d-lib_1", "3f2a9c0d-lib_1")]
    fn test_verbatim_storage_keys(#[case] id: &str, #[case] expected: &str) {
        assert_eq!(LibraryId::new(id).storage_key(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("../../etc")]
    #[case("a/b")]
    #[case("Calibre Library")]
    fn test_hashed_storage_keys(#[case] id: &str) {
        let key = LibraryId::new(id).storage_key();
        assert!(key.starts_with('~'));
        assert_eq!(key.len(), 33);
        assert!(!key.contains('/'));
    }

    #[test]
    fn test_distinct_ids_distinct_keys() {
        assert_ne!(LibraryId::new("a/b").storage_key(), LibraryId::new("a\\b").storage_key());
        assert_ne!(LibraryId::generate(), LibraryId::generate());
    }

    #[test]
    fn test_new_from_path() {
        let root: RemoteRoot = "/Books/Calibre Library".parse().unwrap();
        let library = Library::new(LibraryId::new("a"), root, None);
        assert_eq!(library.name, "Calibre Library");
        assert!(!library.is_shared());
        assert_eq!(
            library.catalog_location().unwrap(),
            Location::Path(PathBuf::from("/Books/Calibre Library/metadata.db"))
        );
    }

    #[test]
    fn test_new_from_shared_link() {
        let link = "https://www.dropbox.com/scl/fo/abc?rlkey=x";
        let library = Library::new(LibraryId::new("a"), link.parse().unwrap(), Some("Family".to_string()));
        assert_eq!(library.name, "Family");
        assert_eq!(
            library.catalog_location().unwrap(),
            Location::Shared { link: link.to_string(), path: PathBuf::from("metadata.db") }
        );
    }

    #[test]
    fn test_item_locations() {
        let library = Library::new(LibraryId::new("a"), "/Calibre".parse().unwrap(), None);
        let item = Item {
            id: 4,
            title: "Mort".to_string(),
            authors: Some("Terry Pratchett".to_string()),
            path: "Terry Pratchett/Mort (4)".to_string(),
            has_cover: true,
            formats: vec![Format { format: "EPUB".to_string(), name: "Mort - Terry Pratchett".to_string(), size: 10 }],
            description: None,
        };
        let Location::Path(cover) = library.cover_location(&item).unwrap() else { panic!("expected a path") };
        assert_eq!(cover, Path::new("/Calibre/Terry Pratchett/Mort (4)/cover.jpg"));
        let Location::Path(file) = library.format_location(&item, &item.formats[0]).unwrap() else {
            panic!("expected a path")
        };
        assert_eq!(file, Path::new("/Calibre/Terry Pratchett/Mort (4)/Mort - Terry Pratchett.epub"));
    }

    #[test]
    fn test_serde_round_trip_omits_missing_link() {
        let library = Library::new(LibraryId::new("a"), "/Calibre".parse().unwrap(), None);
        let json = serde_json::to_string(&library).unwrap();
        assert!(!json.contains("shared_link"));
        assert_eq!(serde_json::from_str::<Library>(&json).unwrap(), library);
    }
}
