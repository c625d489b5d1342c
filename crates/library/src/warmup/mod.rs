//! Background cover warm-up.
//!
//! After a catalog loads, every item that has a cover but no cached copy is
//! fetched in the background so that scrolling the list does not hit the
//! remote item by item. [`warm_up`] is the pass itself as a stream of
//! events; [`WarmUpScheduler`] runs passes as tasks, at most one per library.

mod scheduler;
mod stream;

pub use self::scheduler::{WarmUp, WarmUpScheduler};
pub use self::stream::{Summary, WarmUpEvent, warm_up};

/// Default number of covers fetched concurrently by one pass.
pub const DEFAULT_CONCURRENCY: usize = 8;
