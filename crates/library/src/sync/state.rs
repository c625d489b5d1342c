use std::fmt;

/// Where a library's catalog is in its lifecycle.
///
/// ```text
/// Absent ──▶ StaleCheck ──▶ Ready
///                 │           ▲
///                 ▼           │
///            Downloading ─────┘
///                 │
///                 ▼
///               Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    /// No replica handle is open.
    #[default]
    Absent,
    /// Deciding whether the local replica can be used as is.
    StaleCheck,
    /// Streaming a fresh snapshot from the remote.
    Downloading,
    /// A replica handle is open and serving queries.
    Ready,
    /// The last attempt failed; any previous replica is untouched.
    Failed,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Absent => "absent",
            Self::StaleCheck => "checking",
            Self::Downloading => "downloading",
            Self::Ready => "ready",
            Self::Failed => "failed",
        })
    }
}
