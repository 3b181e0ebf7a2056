//! Replication engine.
//!
//! The source walks and watches its root and turns every change into an
//! [`Action`]; the target applies actions and reconciles against the tree
//! the source advertises.

pub mod action;
pub mod path;
pub mod source;
pub mod target;
pub mod walker;
pub mod watch_set;

pub use action::{Action, Reply};
pub use source::{SourceReplicator, SourceStats};
pub use target::{TargetReplicator, TargetStats};
pub use walker::DirectoryWalker;
pub use watch_set::{Removal, WatchSet};
