//! Resolving library-relative object paths against a remote root.

use crate::error::Result;
use crate::path::{join_remote, validate};
use std::fmt;
use std::path::{Path, PathBuf};

/// Fully resolved address of a remote object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Absolute remote path.
    Path(PathBuf),
    /// Path relative to the folder behind a shared link.
    Shared { link: String, path: PathBuf },
}

impl Location {
    /// Resolve `relative` for a library rooted at `root`.
    ///
    /// When the library is reached through a shared link, the root is not
    /// consulted at all; the link already identifies the folder.
    ///
    /// ```
    /// use std::path::PathBuf;
    /// use shelf_storage::Location;
    /// let plain = Location::resolve("/Calibre Library", None, "metadata.db").unwrap();
    /// assert_eq!(plain, Location::Path(PathBuf::from("/Calibre Library/metadata.db")));
    /// let shared = Location::resolve("/ignored", Some("https://link"), "A/B (1)/cover.jpg").unwrap();
    /// assert_eq!(shared, Location::Shared { link: "https://link".into(), path: PathBuf::from("A/B (1)/cover.jpg") });
    /// ```
    pub fn resolve(root: impl AsRef<Path>, shared_link: Option<&str>, relative: impl AsRef<Path>) -> Result<Self> {
        match shared_link {
            Some(link) => Ok(Self::Shared {
                link: link.to_string(),
                path: validate(relative)?,
            }),
            None => Ok(Self::Path(join_remote(root, relative)?)),
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, Self::Shared { .. })
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Shared { link, path } => write!(f, "{link}#{}", path.display()),
        }
    }
}
