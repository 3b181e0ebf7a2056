//! Bookkeeping of what the source currently tracks under its root.

use std::collections::BTreeSet;

use crate::sync::path::is_within;

/// Relative directories and files known under the replication root.
///
/// Every file's ancestor directories are present in `dirs`, and the root is
/// always recorded as `""` when the set is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSet {
    dirs: BTreeSet<String>,
    files: BTreeSet<String>,
}

/// Entries dropped from a [`WatchSet`] by [`WatchSet::remove`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Removal {
    /// Directories whose watches must be canceled.
    pub dirs: Vec<String>,
    /// Files equal to or beneath the removed path.
    pub files: Vec<String>,
}

impl Default for WatchSet {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchSet {
    pub fn new() -> Self {
        Self {
            dirs: BTreeSet::from([String::new()]),
            files: BTreeSet::new(),
        }
    }

    pub fn insert_dir(&mut self, relative: impl Into<String>) -> bool {
        self.dirs.insert(relative.into())
    }

    pub fn insert_file(&mut self, relative: impl Into<String>) -> bool {
        self.files.insert(relative.into())
    }

    pub fn contains_dir(&self, relative: &str) -> bool {
        self.dirs.contains(relative)
    }

    pub fn contains_file(&self, relative: &str) -> bool {
        self.files.contains(relative)
    }

    pub fn dirs(&self) -> &BTreeSet<String> {
        &self.dirs
    }

    pub fn files(&self) -> &BTreeSet<String> {
        &self.files
    }

    /// Forget `relative` and, if it was a directory, everything under it.
    ///
    /// The path's type is not known here (it is already gone from disk), so
    /// both sets are matched by segment prefix. Files under a removed
    /// directory go with it, keeping every file's ancestors in `dirs`.
    pub fn remove(&mut self, relative: &str) -> Removal {
        let dirs = drain_within(&mut self.dirs, relative);
        let files = drain_within(&mut self.files, relative);
        Removal { dirs, files }
    }

    /// Snapshot of both sets, as advertised in a `sync` action.
    pub fn snapshot(&self) -> (BTreeSet<String>, BTreeSet<String>) {
        (self.dirs.clone(), self.files.clone())
    }
}

fn drain_within(set: &mut BTreeSet<String>, relative: &str) -> Vec<String> {
    let matched: Vec<String> = set
        .iter()
        .filter(|path| is_within(relative, path))
        .cloned()
        .collect();
    for path in &matched {
        set.remove(path);
    }
    matched
}
