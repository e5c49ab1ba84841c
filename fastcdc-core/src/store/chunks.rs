use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{FilterError, Result};

/// Directory under the repository root holding chunk manifest files.
pub const CHUNK_DIR: &str = ".cdc";

/// Extension shared by every chunk manifest file.
pub const CHUNK_EXT: &str = "cdc";

/// Whether `hash` is a plausible content hash from the host: non-trivial,
/// even-length, lower-case hex. Hash strings are spliced into filesystem
/// paths and subprocess arguments, so anything else is rejected.
pub fn is_hash(hash: &str) -> bool {
    hash.len() >= 4
        && hash.len() % 2 == 0
        && !hash.bytes().any(|b| b.is_ascii_uppercase())
        && hex::decode(hash).is_ok()
}

/// On-disk store of chunk manifest files, fanned out two hex levels deep:
/// `<root>/<hh>/<hh2>/<hash>.cdc`. The filename stem, the file contents,
/// and the object-store hash of the chunk are all the same string.
pub struct ChunkStore {
    root: PathBuf,
}

impl ChunkStore {
    /// `root` is the chunk directory itself, not the repository root.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.exists()
    }

    fn manifest_path(&self, hash: &str) -> Result<PathBuf> {
        if !is_hash(hash) {
            return Err(FilterError::Protocol(format!(
                "malformed content hash {hash:?}"
            )));
        }
        let dir = self.root.join(&hash[0..2]).join(&hash[2..4]);
        fs::create_dir_all(&dir)?;
        Ok(dir.join(format!("{hash}.{CHUNK_EXT}")))
    }

    /// Write the manifest file for `hash`. Returns whether the file did
    /// not previously exist.
    pub fn materialize(&self, hash: &str) -> Result<bool> {
        let path = self.manifest_path(hash)?;
        let fresh = !path.exists();
        fs::write(&path, hash)?;
        Ok(fresh)
    }

    /// Every existing manifest file under the chunk root, lazily.
    pub fn enumerate(&self) -> impl Iterator<Item = PathBuf> {
        WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().is_some_and(|x| x == CHUNK_EXT))
            .map(|e| e.into_path())
    }

    pub fn delete(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)?;
        Ok(())
    }

    /// Post-order walk removing every directory that became empty,
    /// including the root itself.
    pub fn prune_empty_dirs(&self) -> Result<()> {
        prune_below(&self.root)
    }
}

fn prune_below(dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            prune_below(&path)?;
        }
    }
    if fs::read_dir(dir)?.next().is_none() {
        fs::remove_dir(dir)?;
    }
    Ok(())
}
