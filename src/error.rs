//! Error types shared by both sides of a replication session.
//!
//! Most fallible calls return `anyhow::Result` with path context attached. The
//! variants below are the ones callers may want to match on.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplicaError {
    /// An event or walk produced a path that does not live under the root.
    #[error("path {path} is outside replication root {root}")]
    PathOutsideRoot { path: PathBuf, root: PathBuf },

    /// Names that are not valid UTF-8 have no wire form.
    #[error("path {path:?} is not valid UTF-8 and cannot be replicated")]
    NonUtf8Path { path: PathBuf },

    /// The target refuses relative paths that could escape its root.
    #[error("invalid relative path {path:?}: {reason}")]
    InvalidRelativePath { path: String, reason: &'static str },

    /// The target applied the action and reported a failure.
    #[error("target failed to apply {action} {path:?}: {message}")]
    RemoteFailure {
        action: String,
        path: String,
        message: String,
    },

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error("connection closed by peer")]
    ConnectionClosed,
}

/// Returns true when the error chain holds an `io::Error` of kind `NotFound`.
///
/// This is the only failure the replicators absorb: a path that vanished
/// between notification and inspection, or a watch that is already gone.
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<io::Error>()
            .is_some_and(|e| e.kind() == io::ErrorKind::NotFound)
    })
}
