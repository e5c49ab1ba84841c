use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::chunking::engine::{self, ChunkParams, SpillFile};
use crate::error::{FilterError, Result};
use crate::proto::pkt::PacketChannel;
use crate::store::chunks::{self, CHUNK_DIR, ChunkStore};
use crate::store::gateway::ObjectStore;

/// Pathname prefix routing a request to the chunk-tree handlers.
const RESERVED_PREFIX: &str = ".cdc/";

/// Suffix of chunk manifest files and of user blob manifest lines.
const MANIFEST_SUFFIX: &str = ".cdc";

/// Immutable per-session settings, resolved once before the handshake.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Spill incoming blobs to disk instead of buffering them.
    pub ondisk: bool,
    /// Repository root; the chunk tree and the spill file live under it.
    pub root: PathBuf,
}

impl SessionConfig {
    /// Resolve settings from the store's local configuration. Only the
    /// exact value `true` under `fastcdc.ondisk` selects on-disk mode.
    pub fn resolve<S: ObjectStore>(store: &S) -> Result<Self> {
        let raw = store.read_config("fastcdc.ondisk")?;
        let ondisk = String::from_utf8_lossy(&raw).trim() == "true";
        Ok(Self {
            ondisk,
            root: store.repo_root()?,
        })
    }
}

/// The long-running filter protocol engine. One instance serves one
/// `process` invocation: a capability handshake, then requests until the
/// host closes the stream, strictly one at a time.
pub struct FilterSession<'a, R, W, S> {
    chan: PacketChannel<R, W>,
    store: &'a S,
    chunks: ChunkStore,
    config: SessionConfig,
    any_new_chunk: bool,
}

impl<'a, R: Read, W: Write, S: ObjectStore> FilterSession<'a, R, W, S> {
    pub fn new(chan: PacketChannel<R, W>, store: &'a S, config: SessionConfig) -> Self {
        let chunks = ChunkStore::new(config.root.join(CHUNK_DIR));
        Self {
            chan,
            store,
            chunks,
            config,
            any_new_chunk: false,
        }
    }

    /// Serve the whole session. On return the chunk tree has been staged
    /// if any chunk was observed for the first time.
    pub fn run(&mut self) -> Result<()> {
        self.handshake()?;
        loop {
            let line = self.chan.read_pkt_str()?;
            if line.is_empty() {
                break;
            }
            let command = expect_kv(&line, "command")?;
            let pathname = expect_kv(&self.chan.read_pkt_str()?, "pathname")?;
            if pathname.is_empty() {
                return Err(FilterError::Protocol("empty pathname in request".into()));
            }
            let blob = self.read_request_meta()?;
            debug!(%command, %pathname, "filter request");
            self.dispatch(&command, &pathname, blob.as_deref())?;
        }
        if self.any_new_chunk && self.chunks.exists() {
            self.store.stage_paths(&[CHUNK_DIR])?;
        }
        Ok(())
    }

    fn handshake(&mut self) -> Result<()> {
        expect_exact(&self.chan.read_pkt_str()?, "git-filter-client")?;
        expect_exact(&self.chan.read_pkt_str()?, "version=2")?;
        self.chan.write_pkt_str("git-filter-server")?;
        self.chan.write_pkt_str("version=2")?;
        self.chan.flush_pkt()?;

        let end = self.chan.read_pkt_str()?;
        if !end.is_empty() {
            return Err(FilterError::Protocol(format!(
                "expected end of welcome, got {end:?}"
            )));
        }

        let mut caps = Vec::new();
        loop {
            let line = self.chan.read_pkt_str()?;
            if line.is_empty() {
                break;
            }
            caps.push(expect_kv(&line, "capability")?);
        }
        for need in ["clean", "smudge"] {
            if !caps.iter().any(|c| c == need) {
                return Err(FilterError::Protocol(format!(
                    "host lacks required capability {need:?}"
                )));
            }
        }
        self.chan.write_pkt_str("capability=clean")?;
        self.chan.write_pkt_str("capability=smudge")?;
        self.chan.flush_pkt()?;
        Ok(())
    }

    /// Read `key=value` header packets up to their empty terminator,
    /// keeping the only one the handlers consume.
    fn read_request_meta(&mut self) -> Result<Option<String>> {
        let mut blob = None;
        loop {
            let line = self.chan.read_pkt_str()?;
            if line.is_empty() {
                return Ok(blob);
            }
            match line.split_once('=') {
                Some(("blob", value)) => blob = Some(value.to_string()),
                Some(("treeish" | "ref", _)) => {}
                Some((key, _)) => debug!(key, "ignoring unknown request header"),
                None => debug!(header = %line, "ignoring malformed request header"),
            }
        }
    }

    fn dispatch(&mut self, command: &str, pathname: &str, blob: Option<&str>) -> Result<()> {
        let reserved = pathname.starts_with(RESERVED_PREFIX);
        match command {
            "clean" if reserved => {
                if pathname.ends_with(MANIFEST_SUFFIX) {
                    self.clean_manifest()
                } else {
                    self.passthrough()
                }
            }
            "clean" => {
                let fresh = if self.config.ondisk {
                    self.clean_regular_ondisk()?
                } else {
                    self.clean_regular_buffered()?
                };
                self.any_new_chunk |= fresh;
                Ok(())
            }
            "smudge" if reserved => self.smudge_manifest(pathname, blob),
            "smudge" => self.smudge_regular(),
            other => Err(FilterError::Protocol(format!(
                "unsupported filter command {other:?}"
            ))),
        }
    }

    fn read_payload(&mut self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        loop {
            let pkt = self.chan.read_pkt()?;
            if pkt.is_empty() {
                break;
            }
            data.extend_from_slice(&pkt);
        }
        Ok(data)
    }

    fn begin_response(&mut self) -> Result<()> {
        self.chan.write_pkt_str("status=success\n")?;
        self.chan.flush_pkt()
    }

    fn end_response(&mut self) -> Result<()> {
        self.chan.flush_pkt()?;
        self.chan.flush_pkt()
    }

    /// Chunk a staged blob held in memory; emit one manifest line per
    /// chunk, in input order.
    fn clean_regular_buffered(&mut self) -> Result<bool> {
        let data = self.read_payload()?;
        let params = ChunkParams::from_len(data.len() as u64);
        self.begin_response()?;
        let mut fresh = false;
        for span in engine::cut(&data, params) {
            let start = span.offset as usize;
            let hash = self.store.store_bytes(&data[start..start + span.length])?;
            fresh |= self.chunks.materialize(&hash)?;
            self.chan.write_pkt_str(&manifest_line(&hash))?;
        }
        self.end_response()?;
        Ok(fresh)
    }

    /// As above, but spill the payload to the reserved temp file first
    /// and chunk by streaming from it. The spill guard removes the file
    /// on every exit path.
    fn clean_regular_ondisk(&mut self) -> Result<bool> {
        let spill = SpillFile::new(&self.config.root);
        let mut sink = spill.create()?;
        loop {
            let pkt = self.chan.read_pkt()?;
            if pkt.is_empty() {
                break;
            }
            sink.write_all(&pkt)?;
        }
        sink.flush()?;
        drop(sink);

        let params = ChunkParams::from_len(spill.size()?);
        self.begin_response()?;
        let mut fresh = false;
        for item in engine::cut_stream(spill.open()?, params) {
            let (_, bytes) = item?;
            let hash = self.store.store_bytes(&bytes)?;
            fresh |= self.chunks.materialize(&hash)?;
            self.chan.write_pkt_str(&manifest_line(&hash))?;
        }
        self.end_response()?;
        Ok(fresh)
    }

    /// The chunk blob already sits in the object store from the clean
    /// that produced it; re-emit its bytes so the host stores them under
    /// the manifest's own path.
    fn clean_manifest(&mut self) -> Result<()> {
        let hash = self.chan.read_pkt_str()?;
        let terminator = self.chan.read_pkt()?;
        if !terminator.is_empty() {
            return Err(FilterError::Protocol(
                "chunk manifest payload carries more than a hash".into(),
            ));
        }
        if !chunks::is_hash(&hash) {
            return Err(FilterError::Protocol(format!(
                "malformed content hash {hash:?}"
            )));
        }
        self.begin_response()?;
        let blob = self.store.fetch_bytes(&hash)?;
        self.chan.write_split(&blob)?;
        self.end_response()
    }

    /// Re-emit a non-manifest file under the chunk tree untouched,
    /// keeping the original packet boundaries.
    fn passthrough(&mut self) -> Result<()> {
        let mut pkts = Vec::new();
        loop {
            let pkt = self.chan.read_pkt()?;
            if pkt.is_empty() {
                break;
            }
            pkts.push(pkt);
        }
        self.begin_response()?;
        for pkt in &pkts {
            self.chan.write_pkt(pkt)?;
        }
        self.end_response()
    }

    /// Rebuild the original file from its manifest: fetch every
    /// referenced chunk in order and stream the bytes back. The whole
    /// payload is gathered first; packet boundaries need not fall on
    /// line breaks.
    fn smudge_regular(&mut self) -> Result<()> {
        let payload = self.read_payload()?;
        let manifest = String::from_utf8_lossy(&payload).into_owned();
        self.begin_response()?;
        for line in manifest.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let blob = self.store.fetch_bytes(manifest_stem(line)?)?;
            self.chan.write_split(&blob)?;
        }
        self.end_response()
    }

    /// A manifest file's working-tree content is just its hash, carried
    /// by the `blob` header. The payload itself is discarded.
    fn smudge_manifest(&mut self, pathname: &str, blob: Option<&str>) -> Result<()> {
        loop {
            if self.chan.read_pkt()?.is_empty() {
                break;
            }
        }
        let blob = blob.ok_or_else(|| {
            FilterError::Protocol("smudge of a chunk manifest without a blob header".into())
        })?;
        let stem = Path::new(pathname)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("");
        if stem != blob {
            return Err(FilterError::Protocol(format!(
                "manifest stem {stem:?} does not match blob header {blob:?}"
            )));
        }
        self.begin_response()?;
        self.chan.write_pkt_str(blob)?;
        self.end_response()
    }
}

fn manifest_line(hash: &str) -> String {
    format!("{hash}{MANIFEST_SUFFIX}\n")
}

fn manifest_stem(line: &str) -> Result<&str> {
    let stem = line.strip_suffix(MANIFEST_SUFFIX).unwrap_or(line);
    if !chunks::is_hash(stem) {
        return Err(FilterError::Protocol(format!(
            "malformed manifest line {line:?}"
        )));
    }
    Ok(stem)
}

fn expect_kv(line: &str, key: &str) -> Result<String> {
    match line.split_once('=') {
        Some((k, v)) if k == key => Ok(v.to_string()),
        _ => Err(FilterError::Protocol(format!(
            "expected {key}=<value>, got {line:?}"
        ))),
    }
}

fn expect_exact(line: &str, want: &str) -> Result<()> {
    if line == want {
        Ok(())
    } else {
        Err(FilterError::Protocol(format!(
            "expected {want:?}, got {line:?}"
        )))
    }
}
