use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::error::{FilterError, Result};
use crate::store::gateway::ObjectStore;

/// Object store backed by the host `git` binary. Every call is one child
/// process; non-zero exits are fatal except where noted on the trait.
#[derive(Default)]
pub struct GitStore;

impl GitStore {
    pub fn new() -> Self {
        Self
    }

    fn run(args: &[&str]) -> Result<Vec<u8>> {
        let out = Command::new("git").args(args).output()?;
        if !out.status.success() {
            return Err(git_error(args, &out.stderr));
        }
        Ok(out.stdout)
    }

    pub fn set_local_config(&self, key: &str, value: &str) -> Result<()> {
        Self::run(&["config", "--local", key, value]).map(|_| ())
    }

    /// Unset a local config key. The key may not be set, so failures are
    /// ignored.
    pub fn unset_local_config(&self, key: &str) {
        let _ = Command::new("git")
            .args(["config", "--local", "--unset", key])
            .stderr(Stdio::null())
            .status();
    }
}

fn git_error(args: &[&str], stderr: &[u8]) -> FilterError {
    FilterError::Git {
        op: args.first().copied().unwrap_or("git").to_string(),
        detail: String::from_utf8_lossy(stderr).trim().to_string(),
    }
}

impl ObjectStore for GitStore {
    fn store_bytes(&self, payload: &[u8]) -> Result<String> {
        let mut child = Command::new("git")
            .args(["hash-object", "-w", "-t", "blob", "--stdin"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        child
            .stdin
            .take()
            .ok_or_else(|| FilterError::Git {
                op: "hash-object".into(),
                detail: "no stdin handle on child".into(),
            })?
            .write_all(payload)?;
        let out = child.wait_with_output()?;
        if !out.status.success() {
            return Err(git_error(&["hash-object"], &out.stderr));
        }
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }

    fn fetch_bytes(&self, hash: &str) -> Result<Vec<u8>> {
        Self::run(&["cat-file", "blob", hash])
    }

    fn tracked_paths(&self) -> Result<String> {
        let out = Self::run(&["ls-files"])?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    fn show_staged(&self, path: &str) -> Result<Vec<u8>> {
        let spec = format!(":{path}");
        Self::run(&["show", &spec])
    }

    fn stage_paths(&self, paths: &[&str]) -> Result<()> {
        let mut args = vec!["add"];
        args.extend_from_slice(paths);
        Self::run(&args).map(|_| ())
    }

    fn read_config(&self, key: &str) -> Result<Vec<u8>> {
        // Absent keys exit non-zero; that is not an error here.
        let out = Command::new("git")
            .args(["config", "--local", "--get", key])
            .output()?;
        Ok(out.stdout)
    }

    fn repo_root(&self) -> Result<PathBuf> {
        let out = Self::run(&["rev-parse", "--show-toplevel"])?;
        let path = String::from_utf8_lossy(&out).trim().to_string();
        Ok(PathBuf::from(path))
    }
}
