//! Cover image cache.
//!
//! Covers are stored one file per `(library, item)` under the library's own
//! namespace directory. The cache itself never talks to the remote; callers
//! do the read-through with [`read_through()`] (or their own equivalent) and
//! store what they fetched with [`CoverCache::put()`].

mod cache;
pub(crate) mod fetch;

pub use self::cache::CoverCache;
pub use self::fetch::read_through;
