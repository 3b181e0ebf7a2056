//! Target side of a replication session.
//!
//! Keeps no record of its own; every action is checked against the live
//! filesystem, which makes each one idempotent. Symbolic links under the root
//! are never followed: they count as wrong-typed entries and are deleted.

use anyhow::Result;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::ReplicaError;
use crate::fs::FileSystem;
use crate::sync::action::Action;
use crate::sync::path::{absolute_path, relative_path, validate_relative};

/// Counters for everything the target changed or declined to change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetStats {
    pub files_written: usize,
    /// Writes skipped because the content was already identical.
    pub writes_skipped: usize,
    pub dirs_created: usize,
    pub paths_removed: usize,
    /// Entries deleted because they had the wrong type.
    pub conflicts_resolved: usize,
    /// Entries deleted by reconciliation.
    pub orphans_deleted: usize,
    pub syncs: usize,
}

pub struct TargetReplicator {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    stats: TargetStats,
}

impl TargetReplicator {
    pub fn new(fs: Arc<dyn FileSystem>, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
            stats: TargetStats::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stats(&self) -> &TargetStats {
        &self.stats
    }

    /// Apply one action. On return the tree satisfies the action's contract.
    pub async fn handle_request(&mut self, action: Action) -> Result<()> {
        debug!(action = action.name(), path = action.relative_path(), "Applying action");
        match action {
            Action::Write {
                relative_path,
                content,
            } => self.apply_write(&relative_path, &content).await,
            Action::MkDir { relative_path } => self.apply_mkdir(&relative_path).await,
            Action::Remove { relative_path } => self.apply_remove(&relative_path).await,
            Action::Sync { dirs, files, .. } => self.sync_directory(&dirs, &files).await,
        }
    }

    async fn apply_write(&mut self, relative: &str, content: &[u8]) -> Result<()> {
        validate_relative(relative)?;
        if relative.is_empty() {
            return Err(ReplicaError::InvalidRelativePath {
                path: String::new(),
                reason: "cannot write file content to the root",
            }
            .into());
        }

        let path = absolute_path(&self.root, relative);
        if let Some(parent) = path.parent() {
            self.ensure_dir(parent).await?;
        }

        if self.fs.is_dir(&path).await? {
            debug!("Replacing directory with file: {}", path.display());
            self.fs.remove_dir(&path).await?;
            self.stats.conflicts_resolved += 1;
        } else if self.fs.is_symlink(&path).await? {
            debug!("Replacing symbolic link with file: {}", path.display());
            self.fs.remove_file(&path).await?;
            self.stats.conflicts_resolved += 1;
        }

        if self.fs.exists(&path).await? && self.fs.read_file(&path).await? == content {
            self.stats.writes_skipped += 1;
            return Ok(());
        }

        self.fs.write_file(&path, content).await?;
        self.stats.files_written += 1;
        Ok(())
    }

    async fn apply_mkdir(&mut self, relative: &str) -> Result<()> {
        validate_relative(relative)?;
        let path = absolute_path(&self.root, relative);
        self.ensure_dir(&path).await
    }

    async fn apply_remove(&mut self, relative: &str) -> Result<()> {
        validate_relative(relative)?;
        let path = absolute_path(&self.root, relative);

        if !self.has_real_parents(&path).await? || !self.fs.exists(&path).await? {
            debug!("Nothing to remove at {}", path.display());
            return Ok(());
        }

        if relative.is_empty() {
            // The root itself stays; only its contents go.
            for name in self.fs.list_dir(&path).await? {
                self.remove_entry(&path.join(name)).await?;
            }
        } else {
            self.remove_entry(&path).await?;
        }
        Ok(())
    }

    /// Delete every entry under the root that is not in `dirs` or `files`.
    ///
    /// Unlisted directories are removed whole without descending. Symbolic
    /// links and names that are not valid UTF-8 can never be listed, so they
    /// always go. Nothing is ever created here.
    pub async fn sync_directory(
        &mut self,
        dirs: &BTreeSet<String>,
        files: &BTreeSet<String>,
    ) -> Result<()> {
        self.stats.syncs += 1;
        if !self.fs.is_dir(&self.root).await? {
            debug!("Target root {} does not exist yet", self.root.display());
            return Ok(());
        }

        let deleted_before = self.stats.orphans_deleted;
        let mut to_scan = vec![self.root.clone()];

        while let Some(dir) = to_scan.pop() {
            for name in self.fs.list_dir(&dir).await? {
                let path = dir.join(&name);
                let relative = relative_path(&self.root, &path).ok();
                let listed =
                    |set: &BTreeSet<String>| relative.as_ref().is_some_and(|r| set.contains(r));

                if self.fs.is_symlink(&path).await? {
                    debug!("Deleting symbolic link {}", path.display());
                    self.fs.remove_file(&path).await?;
                    self.stats.orphans_deleted += 1;
                } else if self.fs.is_dir(&path).await? {
                    if listed(dirs) {
                        to_scan.push(path);
                    } else {
                        debug!("Deleting orphaned directory {}", path.display());
                        self.fs.remove_dir(&path).await?;
                        self.stats.orphans_deleted += 1;
                    }
                } else if !listed(files) {
                    debug!("Deleting orphaned file {}", path.display());
                    self.fs.remove_file(&path).await?;
                    self.stats.orphans_deleted += 1;
                }
            }
        }

        info!(
            deleted = self.stats.orphans_deleted - deleted_before,
            "Reconciled {}",
            self.root.display()
        );
        Ok(())
    }

    /// Make `dir` a directory, deleting a file or link that occupies it or
    /// any of its ancestors below the root.
    ///
    /// The whole chain is checked even when `dir` resolves to a directory,
    /// since a linked ancestor would make it resolve outside the root.
    async fn ensure_dir(&mut self, dir: &Path) -> Result<()> {
        let chain: Vec<&Path> = dir
            .ancestors()
            .filter(|a| a.starts_with(&self.root) && *a != self.root)
            .collect();
        for ancestor in chain.into_iter().rev() {
            if self.fs.is_dir(ancestor).await? {
                continue;
            }
            if self.fs.exists(ancestor).await? {
                debug!("Replacing non-directory with directory: {}", ancestor.display());
                self.fs.remove_file(ancestor).await?;
                self.stats.conflicts_resolved += 1;
            }
            break;
        }

        if self.fs.is_dir(dir).await? {
            return Ok(());
        }
        self.fs.make_dirs(dir).await?;
        self.stats.dirs_created += 1;
        Ok(())
    }

    /// Whether every ancestor of `path` below the root is a real directory,
    /// so that `path` cannot resolve through a link.
    async fn has_real_parents(&self, path: &Path) -> Result<bool> {
        for ancestor in path.ancestors().skip(1) {
            if ancestor == self.root || !ancestor.starts_with(&self.root) {
                break;
            }
            if !self.fs.is_dir(ancestor).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn remove_entry(&mut self, path: &Path) -> Result<()> {
        if self.fs.is_dir(path).await? {
            self.fs.remove_dir(path).await?;
        } else {
            self.fs.remove_file(path).await?;
        }
        self.stats.paths_removed += 1;
        Ok(())
    }
}
