use anyhow::Result;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;

/// Filesystem capability surface consumed by both replicators.
///
/// All paths are absolute. Symbolic links are never followed by the
/// inspection methods: a link is neither a directory nor a file, only a link.
/// `is_dir`, `is_symlink` and `exists` answer `false` for missing paths;
/// every other operation on a missing path fails with an
/// `io::ErrorKind::NotFound` somewhere in its error chain, which callers test
/// with [`crate::error::is_not_found`].
#[async_trait]
pub trait FileSystem: Send + Sync {
    // ========== Inspection ==========

    /// Names of the entries directly inside `path`.
    async fn list_dir(&self, path: &Path) -> Result<Vec<OsString>>;

    /// True for a real directory, false for a link to one.
    async fn is_dir(&self, path: &Path) -> Result<bool>;

    async fn is_symlink(&self, path: &Path) -> Result<bool>;

    /// True for anything at `path`, dangling links included.
    async fn exists(&self, path: &Path) -> Result<bool>;

    // ========== Content ==========

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    /// Create or truncate `path` with `content`. The parent must exist.
    async fn write_file(&self, path: &Path, content: &[u8]) -> Result<()>;

    // ========== Structure ==========

    async fn remove_file(&self, path: &Path) -> Result<()>;

    /// Remove a directory and everything beneath it.
    async fn remove_dir(&self, path: &Path) -> Result<()>;

    /// Create a directory along with any missing ancestors.
    async fn make_dirs(&self, path: &Path) -> Result<()>;

    // ========== Watching ==========

    /// Start delivering events for the direct children of `path`.
    async fn watch_dir(&self, path: &Path) -> Result<()>;

    /// Stop watching `path`. Fails with `NotFound` if no such watch exists.
    async fn unwatch_dir(&self, path: &Path) -> Result<()>;
}
