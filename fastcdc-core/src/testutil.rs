use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{FilterError, Result};
use crate::store::gateway::ObjectStore;

/// In-memory stand-in for the host object store. Ids are blake3 digests
/// in lower-case hex, the same shape the host's sha256 mode produces.
#[derive(Default)]
pub struct MemStore {
    root: PathBuf,
    pub blobs: RefCell<HashMap<String, Vec<u8>>>,
    pub index: RefCell<HashMap<String, Vec<u8>>>,
    pub staged: RefCell<Vec<String>>,
    pub config: RefCell<HashMap<String, Vec<u8>>>,
    pub tracked: RefCell<Vec<String>>,
}

impl MemStore {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            ..Default::default()
        }
    }
}

impl ObjectStore for MemStore {
    fn store_bytes(&self, payload: &[u8]) -> Result<String> {
        let hash = hex::encode(blake3::hash(payload).as_bytes());
        self.blobs
            .borrow_mut()
            .insert(hash.clone(), payload.to_vec());
        Ok(hash)
    }

    fn fetch_bytes(&self, hash: &str) -> Result<Vec<u8>> {
        self.blobs
            .borrow()
            .get(hash)
            .cloned()
            .ok_or_else(|| FilterError::Git {
                op: "cat-file".into(),
                detail: format!("missing blob {hash}"),
            })
    }

    fn tracked_paths(&self) -> Result<String> {
        Ok(self.tracked.borrow().join("\n"))
    }

    fn show_staged(&self, path: &str) -> Result<Vec<u8>> {
        self.index
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| FilterError::Git {
                op: "show".into(),
                detail: format!("nothing staged at {path}"),
            })
    }

    fn stage_paths(&self, paths: &[&str]) -> Result<()> {
        self.staged
            .borrow_mut()
            .extend(paths.iter().map(|p| p.to_string()));
        Ok(())
    }

    fn read_config(&self, key: &str) -> Result<Vec<u8>> {
        Ok(self.config.borrow().get(key).cloned().unwrap_or_default())
    }

    fn repo_root(&self) -> Result<PathBuf> {
        Ok(self.root.clone())
    }
}
