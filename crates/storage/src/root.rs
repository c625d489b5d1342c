//! Parsing user-supplied library locations.
//!
//! Users paste whatever their file-sharing client gave them: a folder path,
//! a browser URL of that folder, or a shared link. [`RemoteRoot`] sorts those
//! into the two addressing modes a [`StorageBackend`](crate::StorageBackend)
//! understands.

use crate::error::{Error, ErrorKind};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use url::Url;

/// Host whose URLs are understood as remote locations.
const REMOTE_HOST: &str = "dropbox.com";
/// Browser URLs of the form `/home/<folder>` map directly onto a folder path.
const HOME_PREFIX: &str = "/home";
/// Shared folder links; the folder name is not part of the URL and must be
/// resolved by the remote itself.
const SHARED_PREFIXES: [&str; 2] = ["/scl/", "/sh/"];

/// Where a library lives on the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteRoot {
    /// Absolute folder path on the remote, e.g. `/Calibre Library`.
    Path(PathBuf),
    /// Shared link (the full URL acts as the link token).
    SharedLink(String),
}

impl RemoteRoot {
    /// Human-friendly name: the last path segment, `"Library"` if there is none.
    ///
    /// ```
    /// use shelf_storage::RemoteRoot;
    /// let root: RemoteRoot = "/My Books/Calibre/".parse().unwrap();
    /// assert_eq!(root.display_name(), "Calibre");
    /// ```
    pub fn display_name(&self) -> String {
        match self {
            Self::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| "Library".to_string()),
            Self::SharedLink(_) => "Shared Library".to_string(),
        }
    }

    pub fn is_shared_link(&self) -> bool {
        matches!(self, Self::SharedLink(_))
    }

    fn from_url(input: &str) -> Result<Self, Error> {
        let invalid = || ErrorKind::InvalidRoot(input.to_string());
        let url = Url::parse(input).map_err(|_| invalid())?;
        let host = url.host_str().ok_or_else(invalid)?;
        if !host.contains(REMOTE_HOST) {
            tracing::warn!(host, "Not a recognised remote host");
            exn::bail!(invalid());
        }
        let path = url.path();
        if SHARED_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
            return Ok(Self::SharedLink(input.to_string()));
        }
        let decoded = urlencoding::decode(path).map_err(|_| invalid())?;
        let folder = match decoded.strip_prefix(HOME_PREFIX) {
            Some(rest) if rest.starts_with('/') => rest,
            _ => decoded.as_ref(),
        };
        if folder.is_empty() || folder == "/" {
            exn::bail!(invalid());
        }
        Ok(Self::Path(PathBuf::from(folder)))
    }
}

impl FromStr for RemoteRoot {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            exn::bail!(ErrorKind::InvalidRoot(input.to_string()));
        }
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Self::from_url(trimmed);
        }
        match trimmed.starts_with('/') {
            true => Ok(Self::Path(PathBuf::from(trimmed))),
            false => Ok(Self::Path(Path::new("/").join(trimmed))),
        }
    }
}

impl fmt::Display for RemoteRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::SharedLink(link) => f.write_str(link),
        }
    }
}
