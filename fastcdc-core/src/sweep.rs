use std::collections::HashSet;
use std::fs;
use std::path::Path;

use globset::{GlobBuilder, GlobMatcher};
use tracing::debug;

use crate::attrs;
use crate::error::{FilterError, Result};
use crate::store::chunks::{CHUNK_DIR, ChunkStore};
use crate::store::gateway::ObjectStore;

/// Pattern matching every chunk manifest file, relative to the root.
const MANIFEST_GLOB: &str = ".cdc/**/*.cdc";

const ATTR_FILE: &str = ".gitattributes";

/// fnmatch-style matcher: `*` may cross directory separators, the way
/// the attribute globs have always been interpreted here.
fn matcher(pattern: &str) -> Option<GlobMatcher> {
    GlobBuilder::new(pattern)
        .literal_separator(false)
        .build()
        .ok()
        .map(|g| g.compile_matcher())
}

/// Delete every chunk manifest no longer referenced by a tracked,
/// filter-bound blob manifest, then drop empty directories and restage
/// the chunk tree.
pub fn prune<S: ObjectStore>(store: &S, root: &Path) -> Result<()> {
    let reserved = matcher(MANIFEST_GLOB).ok_or_else(|| {
        FilterError::Protocol(format!("unbuildable glob {MANIFEST_GLOB:?}"))
    })?;

    let tracked = store.tracked_paths()?;
    let candidates: Vec<&str> = tracked
        .lines()
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter(|entry| !reserved.is_match(entry) && !entry.contains(ATTR_FILE))
        .collect();

    let mut live = HashSet::new();
    let attr_path = root.join(ATTR_FILE);
    if attr_path.exists() {
        for line in fs::read_to_string(&attr_path)?.lines() {
            if !line.contains(attrs::FILTER_TOKEN) || line.contains(attrs::CDC_FILTER_LINE) {
                continue;
            }
            // User-supplied binding; the first token is the path glob.
            // Lines that do not tokenize are skipped, not fatal.
            let Some(tokens) = shlex::split(line) else {
                continue;
            };
            let Some(pattern) = tokens.first() else {
                continue;
            };
            let Some(glob) = matcher(pattern) else {
                continue;
            };
            for entry in &candidates {
                if glob.is_match(entry) {
                    collect_live(store, entry, &mut live)?;
                }
            }
        }
    }

    let chunk_store = ChunkStore::new(root.join(CHUNK_DIR));
    let mut dropped = 0usize;
    for file in chunk_store.enumerate().collect::<Vec<_>>() {
        let name = file.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if !live.contains(name) {
            chunk_store.delete(&file)?;
            dropped += 1;
        }
    }
    debug!(dropped, live = live.len(), "swept chunk store");

    if chunk_store.exists() {
        chunk_store.prune_empty_dirs()?;
    }
    if chunk_store.exists() {
        store.stage_paths(&[CHUNK_DIR])?;
    }
    Ok(())
}

/// Restage `entry` so its manifest is current in the index, then record
/// every chunk file it references.
fn collect_live<S: ObjectStore>(
    store: &S,
    entry: &str,
    live: &mut HashSet<String>,
) -> Result<()> {
    store.stage_paths(&[entry])?;
    let staged = store.show_staged(entry)?;
    for line in String::from_utf8_lossy(&staged).lines() {
        let line = line.trim();
        if !line.is_empty() && line.ends_with(".cdc") {
            live.insert(line.to_string());
        }
    }
    Ok(())
}
