//! Remote path validation and construction.
//!
//! Remote paths are always absolute (`/Calibre Library/metadata.db`), while
//! paths handed to a shared link are relative to the link's folder
//! (`Author/Title (12)/cover.jpg`). Both pass through [`validate`] so that
//! neither can climb out of the folder they were resolved against.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Normalizes a path into its relative components, rejecting anything that
/// would escape the root (`..` past the top), null bytes and platform prefixes.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use shelf_storage::validate_path;
/// assert_eq!(validate_path("/Calibre Library//metadata.db").unwrap(), Path::new("Calibre Library/metadata.db"));
/// assert!(validate_path("../metadata.db").is_err());
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let mut normalized = PathBuf::new();
    for component in original.components() {
        match component {
            Component::Normal(segment) if segment.as_encoded_bytes().contains(&0) => {
                exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
            },
            Component::Normal(segment) => normalized.push(segment),
            Component::CurDir | Component::RootDir => {},
            Component::ParentDir => {
                if !normalized.pop() {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
            },
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(original.to_path_buf())),
        }
    }
    if normalized.as_os_str().is_empty() {
        exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
    }
    Ok(normalized)
}

/// Joins a relative object path onto a remote root, producing the absolute
/// remote path (`/<root>/<relative>`) with duplicate separators collapsed.
///
/// An empty (or `/`) root places the object at the top of the remote.
///
/// ```
/// use std::path::Path;
/// use shelf_storage::join_remote;
/// assert_eq!(join_remote("/Calibre Library/", "metadata.db").unwrap(), Path::new("/Calibre Library/metadata.db"));
/// assert_eq!(join_remote("Books", "A/B (1)/cover.jpg").unwrap(), Path::new("/Books/A/B (1)/cover.jpg"));
/// ```
pub fn join_remote(root: impl AsRef<Path>, relative: impl AsRef<Path>) -> Result<PathBuf> {
    let relative = validate(relative)?;
    let root = root.as_ref();
    let mut absolute = PathBuf::from("/");
    // An empty root is legitimate: the library lives at the top of the remote.
    if root.components().any(|c| matches!(c, Component::Normal(_) | Component::ParentDir)) {
        absolute.push(validate(root)?);
    }
    absolute.push(relative);
    Ok(absolute)
}
