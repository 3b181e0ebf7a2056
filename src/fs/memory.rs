//! In-memory filesystem.
//!
//! Holds a tree of directories and files keyed by absolute path, tracks watch
//! registrations and counts physical writes. Deleting a directory drops the
//! watches beneath it, like inotify does.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::fs::backend::FileSystem;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Dir,
    File(Vec<u8>),
}

/// Node for `/`, which always exists.
static FS_ROOT: Node = Node::Dir;

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<PathBuf, Node>,
    watched: BTreeSet<PathBuf>,
    writes: usize,
}

impl State {
    fn node(&self, path: &Path) -> Option<&Node> {
        if path.parent().is_none() {
            return Some(&FS_ROOT);
        }
        self.nodes.get(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.node(path), Some(Node::Dir))
    }

    /// `Some(true)` for a directory, `Some(false)` for a file.
    fn is_dir_or_file(&self, path: &Path) -> Option<bool> {
        self.node(path).map(|node| matches!(node, Node::Dir))
    }

    fn make_dirs(&mut self, path: &Path) -> io::Result<()> {
        let mut ancestors: Vec<&Path> = path.ancestors().collect();
        ancestors.reverse();
        for ancestor in ancestors {
            match self.is_dir_or_file(ancestor) {
                Some(true) => {}
                Some(false) => {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("{} exists and is a file", ancestor.display()),
                    ))
                }
                None => {
                    self.nodes.insert(ancestor.to_path_buf(), Node::Dir);
                }
            }
        }
        Ok(())
    }

    fn remove_tree(&mut self, path: &Path) {
        self.nodes.retain(|p, _| !p.starts_with(path));
        self.watched.retain(|p| !p.starts_with(path));
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file or directory: {}", path.display()),
    )
}

fn wrong_type(path: &Path, expected: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("{} is not a {expected}", path.display()),
    )
}

#[derive(Debug, Default)]
pub struct MemoryFs {
    state: Mutex<State>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create a directory and its ancestors without going through the trait.
    pub fn add_dir(&self, path: impl AsRef<Path>) -> io::Result<()> {
        self.state().make_dirs(path.as_ref())
    }

    /// Create a file, and its parent chain, without counting it as a write.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) -> io::Result<()> {
        let path = path.as_ref();
        let mut state = self.state();
        if let Some(parent) = path.parent() {
            state.make_dirs(parent)?;
        }
        state
            .nodes
            .insert(path.to_path_buf(), Node::File(content.into()));
        Ok(())
    }

    /// Delete a file or a directory subtree, if present.
    pub fn delete(&self, path: impl AsRef<Path>) {
        self.state().remove_tree(path.as_ref());
    }

    /// Content of a file, `None` for directories and missing paths.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        match self.state().node(path.as_ref()) {
            Some(Node::File(content)) => Some(content.clone()),
            _ => None,
        }
    }

    pub fn is_dir_now(&self, path: impl AsRef<Path>) -> bool {
        self.state().is_dir(path.as_ref())
    }

    /// Number of `write_file` calls that reached the tree.
    pub fn writes(&self) -> usize {
        self.state().writes
    }

    pub fn watched(&self) -> BTreeSet<PathBuf> {
        self.state().watched.clone()
    }

    /// Relative directory and file paths under `root`, `/`-separated, root
    /// itself included as `""`.
    pub fn tree(&self, root: impl AsRef<Path>) -> (BTreeSet<String>, BTreeSet<String>) {
        let root = root.as_ref();
        let state = self.state();
        let mut dirs = BTreeSet::new();
        let mut files = BTreeSet::new();
        if state.is_dir(root) {
            dirs.insert(String::new());
        }
        for (path, node) in &state.nodes {
            let Ok(rel) = path.strip_prefix(root) else {
                continue;
            };
            if rel.as_os_str().is_empty() {
                continue;
            }
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            match node {
                Node::Dir => dirs.insert(rel),
                Node::File(_) => files.insert(rel),
            };
        }
        (dirs, files)
    }
}

#[async_trait]
impl FileSystem for MemoryFs {
    async fn list_dir(&self, path: &Path) -> Result<Vec<OsString>> {
        let state = self.state();
        match state.node(path) {
            Some(Node::Dir) => {}
            Some(Node::File(_)) => return Err(wrong_type(path, "directory").into()),
            None => return Err(not_found(path).into()),
        }
        let names = state
            .nodes
            .keys()
            .filter(|p| p.parent() == Some(path))
            .filter_map(|p| p.file_name())
            .map(|name| name.to_os_string())
            .collect();
        Ok(names)
    }

    async fn is_dir(&self, path: &Path) -> Result<bool> {
        Ok(self.state().is_dir(path))
    }

    /// This tree has no links.
    async fn is_symlink(&self, _path: &Path) -> Result<bool> {
        Ok(false)
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.state().node(path).is_some())
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        match self.state().node(path) {
            Some(Node::File(content)) => Ok(content.clone()),
            Some(Node::Dir) => Err(wrong_type(path, "file").into()),
            None => Err(not_found(path).into()),
        }
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> Result<()> {
        let mut state = self.state();
        match path.parent() {
            Some(parent) if state.is_dir(parent) => {}
            Some(parent) => return Err(not_found(parent).into()),
            None => return Err(wrong_type(path, "file").into()),
        }
        if state.is_dir(path) {
            return Err(wrong_type(path, "file").into());
        }
        state
            .nodes
            .insert(path.to_path_buf(), Node::File(content.to_vec()));
        state.writes += 1;
        Ok(())
    }

    async fn remove_file(&self, path: &Path) -> Result<()> {
        let mut state = self.state();
        match state.is_dir_or_file(path) {
            Some(false) => {
                state.nodes.remove(path);
                Ok(())
            }
            Some(true) => Err(wrong_type(path, "file").into()),
            None => Err(not_found(path).into()),
        }
    }

    async fn remove_dir(&self, path: &Path) -> Result<()> {
        let mut state = self.state();
        match state.is_dir_or_file(path) {
            Some(true) => {
                state.remove_tree(path);
                Ok(())
            }
            Some(false) => Err(wrong_type(path, "directory").into()),
            None => Err(not_found(path).into()),
        }
    }

    async fn make_dirs(&self, path: &Path) -> Result<()> {
        Ok(self.state().make_dirs(path)?)
    }

    async fn watch_dir(&self, path: &Path) -> Result<()> {
        let mut state = self.state();
        if !state.is_dir(path) {
            return Err(not_found(path).into());
        }
        state.watched.insert(path.to_path_buf());
        Ok(())
    }

    async fn unwatch_dir(&self, path: &Path) -> Result<()> {
        if self.state().watched.remove(path) {
            Ok(())
        } else {
            Err(not_found(path).into())
        }
    }
}
