//! Whether the remote can currently be reached with valid credentials.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Answers whether authenticated remote access is available right now.
///
/// Background work (cover warm-up) consults this before starting, so that a
/// signed-out session does not spend its time collecting access errors.
pub trait Credentials: Send + Sync {
    fn is_available(&self) -> bool;
}

/// Credentials for remotes that need none (local mounts, tests).
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAvailable;

impl Credentials for AlwaysAvailable {
    fn is_available(&self) -> bool {
        true
    }
}

/// Credential state toggled by whoever owns the session.
#[derive(Debug, Clone)]
pub struct SessionCredentials(Arc<AtomicBool>);

impl SessionCredentials {
    pub fn new(available: bool) -> Self {
        Self(Arc::new(AtomicBool::new(available)))
    }

    pub fn set_available(&self, available: bool) {
        self.0.store(available, Ordering::SeqCst);
    }
}

impl Credentials for SessionCredentials {
    fn is_available(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_toggles_shared_state() {
        let session = SessionCredentials::new(true);
        let clone = session.clone();
        session.set_available(false);
        assert!(!clone.is_available());
        assert!(AlwaysAvailable.is_available());
    }
}
