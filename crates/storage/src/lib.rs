//! Read-only access to the remote store that hosts Calibre libraries.
//!
//! The cache engine only ever asks two things of a remote: "what does this
//! object look like" ([`StorageBackend::stat`]) and "give me its bytes"
//! ([`StorageBackend::read_into`]). Everything else lives in the crates above.

pub mod backend;
pub mod credentials;
pub mod error;
mod file;
mod location;
mod path;
mod root;

pub use crate::backend::StorageBackend;
pub use crate::credentials::{AlwaysAvailable, Credentials, SessionCredentials};
pub use crate::file::FileInfo;
pub use crate::location::Location;
pub use crate::path::{join_remote, validate as validate_path};
pub use crate::root::RemoteRoot;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
pub type CredentialsHandle = Arc<dyn Credentials>;
