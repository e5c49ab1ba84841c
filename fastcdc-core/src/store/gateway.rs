use std::path::PathBuf;

use crate::error::Result;

/// Synchronous contract over the host DVCS object store. The real
/// implementation spawns the `git` binary; tests substitute an in-memory
/// store behind the same seam.
pub trait ObjectStore {
    /// Store a blob, returning its content hash as lower-case hex text.
    fn store_bytes(&self, payload: &[u8]) -> Result<String>;

    /// Raw bytes of the blob stored under `hash`.
    fn fetch_bytes(&self, hash: &str) -> Result<Vec<u8>>;

    /// Newline-separated list of paths in the staging index.
    fn tracked_paths(&self) -> Result<String>;

    /// Current staged contents of `path` (post-clean).
    fn show_staged(&self, path: &str) -> Result<Vec<u8>>;

    /// Add the given paths to the index.
    fn stage_paths(&self, paths: &[&str]) -> Result<()>;

    /// Local config value for `key`. Empty when the key is absent; absence
    /// is not an error.
    fn read_config(&self, key: &str) -> Result<Vec<u8>>;

    /// Absolute filesystem path of the repository root.
    fn repo_root(&self) -> Result<PathBuf>;
}
