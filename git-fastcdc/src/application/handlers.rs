use std::io;
use std::path::Path;

use fastcdc_core::attrs;
use fastcdc_core::sweep;
use fastcdc_core::{FilterSession, GitStore, ObjectStore, PacketChannel, Result, SessionConfig};

const ATTR_FILE: &str = ".gitattributes";
const PROCESS_KEY: &str = "filter.git_fastcdc.process";
const REQUIRED_KEY: &str = "filter.git_fastcdc.required";
const PROCESS_CMD: &str = "git-fastcdc process";

/// Wire the filter into the current repository. Runs the removal first,
/// so repeated installs converge on the same config and attributes.
pub fn handle_install(git: &GitStore) -> Result<()> {
    handle_remove(git)?;
    git.set_local_config(PROCESS_KEY, PROCESS_CMD)?;
    git.set_local_config(REQUIRED_KEY, "true")?;
    attrs::append_reserved(Path::new(ATTR_FILE))?;
    Ok(())
}

pub fn handle_remove(git: &GitStore) -> Result<()> {
    git.unset_local_config(PROCESS_KEY);
    git.unset_local_config(REQUIRED_KEY);
    attrs::strip_reserved(Path::new(ATTR_FILE))?;
    Ok(())
}

/// Serve one long-running filter session over stdin/stdout.
pub fn handle_process(git: &GitStore) -> Result<()> {
    let config = SessionConfig::resolve(git)?;
    let stdin = io::stdin();
    let stdout = io::stdout();
    let chan = PacketChannel::new(stdin.lock(), stdout.lock());
    FilterSession::new(chan, git, config).run()
}

pub fn handle_prune(git: &GitStore) -> Result<()> {
    let root = git.repo_root()?;
    sweep::prune(git, &root)
}
