use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use fastcdc::v2020::{self, FastCDC, StreamCDC};

use crate::error::Result;

/// Floor for the adaptive average chunk size: 128 KiB.
pub const AVG_FLOOR: u32 = 128 * 1024;

/// Reserved spill file name for on-disk chunking, relative to the
/// repository root. Never present between operations.
pub const SPILL_NAME: &str = ".fast_cdc_tmp_file_29310b6";

/// One contiguous span of the input, in input order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub offset: u64,
    pub length: usize,
}

/// Average chunk size for an input of `len` bytes: one 32nd of the input,
/// quantized down to its top five significant bits so that inputs of
/// similar size select identical cut parameters across revisions, then
/// floored at 128 KiB.
pub fn adaptive_avg(len: u64) -> u32 {
    let bucket = len / 32;
    let bits = u64::BITS - bucket.leading_zeros();
    let shift = bits.saturating_sub(5);
    let quantized = (bucket >> shift) << shift;
    quantized.clamp(u64::from(AVG_FLOOR), u64::from(v2020::AVERAGE_MAX)) as u32
}

/// Cut-point parameters for one input. Only the average is chosen; the
/// minimum and maximum derive from it (a quarter and eight times) and are
/// clamped to the algorithm's documented bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    pub min: u32,
    pub avg: u32,
    pub max: u32,
}

impl ChunkParams {
    pub fn from_len(len: u64) -> Self {
        let avg = adaptive_avg(len);
        let min = (avg / 4).clamp(v2020::MINIMUM_MIN, v2020::MINIMUM_MAX);
        let max = avg
            .saturating_mul(8)
            .clamp(v2020::MAXIMUM_MIN, v2020::MAXIMUM_MAX);
        Self { min, avg, max }
    }
}

/// Cut a fully buffered input into ordered spans covering it exactly.
pub fn cut(data: &[u8], params: ChunkParams) -> impl Iterator<Item = Span> + '_ {
    FastCDC::new(data, params.min, params.avg, params.max).map(|c| Span {
        offset: c.offset as u64,
        length: c.length,
    })
}

/// Cut a spilled input by streaming from `source`, yielding each span
/// together with its bytes.
pub fn cut_stream<R: Read>(
    source: R,
    params: ChunkParams,
) -> impl Iterator<Item = Result<(Span, Vec<u8>)>> {
    StreamCDC::new(source, params.min, params.avg, params.max).map(|item| match item {
        Ok(chunk) => Ok((
            Span {
                offset: chunk.offset,
                length: chunk.length,
            },
            chunk.data,
        )),
        Err(e) => Err(std::io::Error::from(e).into()),
    })
}

/// Scoped owner of the on-disk spill file. The file is removed when the
/// guard goes out of scope, on success and on error alike.
pub struct SpillFile {
    path: PathBuf,
}

impl SpillFile {
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join(SPILL_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn create(&self) -> Result<File> {
        Ok(File::create(&self.path)?)
    }

    pub fn open(&self) -> Result<File> {
        Ok(File::open(&self.path)?)
    }

    pub fn size(&self) -> Result<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }
}

impl Drop for SpillFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io::Write;

    // Deterministic xorshift byte stream, no RNG dependency needed.
    fn pseudo_random(len: usize, mut seed: u64) -> Vec<u8> {
        let mut out = Vec::with_capacity(len);
        while out.len() < len {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            out.extend_from_slice(&seed.to_le_bytes());
        }
        out.truncate(len);
        out
    }

    #[test]
    fn adaptive_avg_floors_small_inputs() {
        assert_eq!(adaptive_avg(0), AVG_FLOOR);
        assert_eq!(adaptive_avg(300 * 1024), AVG_FLOOR);
        // 4 MiB / 32 is exactly the floor.
        assert_eq!(adaptive_avg(4 * 1024 * 1024), AVG_FLOOR);
    }

    #[test]
    fn adaptive_avg_keeps_top_five_bits() {
        // 1234567890 / 32 = 38580246; its top five significant bits give
        // 18 << 21 = 37748736.
        assert_eq!(adaptive_avg(1_234_567_890), 37_748_736);
        // 40 MiB / 32 = 1310720 = 20 << 16, already on the ladder.
        assert_eq!(adaptive_avg(40 * 1024 * 1024), 1_310_720);
    }

    #[test]
    fn adaptive_avg_is_monotonic() {
        let mut last = 0;
        for exp in 10..40 {
            let avg = adaptive_avg(1u64 << exp);
            assert!(avg >= last, "regressed at 2^{exp}");
            last = avg;
        }
    }

    #[test]
    fn params_derive_min_and_max_from_avg() {
        let p = ChunkParams::from_len(0);
        assert_eq!(p.avg, AVG_FLOOR);
        assert_eq!(p.min, AVG_FLOOR / 4);
        assert_eq!(p.max, AVG_FLOOR * 8);
    }

    #[test]
    fn spans_cover_input_exactly() {
        let data = pseudo_random(3 * 1024 * 1024, 11);
        let params = ChunkParams::from_len(data.len() as u64);
        let spans: Vec<Span> = cut(&data, params).collect();
        assert!(!spans.is_empty());

        let mut expected = 0u64;
        for span in &spans {
            assert_eq!(span.offset, expected);
            expected += span.length as u64;
        }
        assert_eq!(expected, data.len() as u64);
    }

    #[test]
    fn stream_mode_cuts_at_the_same_points() {
        let data = pseudo_random(2 * 1024 * 1024, 99);
        let params = ChunkParams::from_len(data.len() as u64);
        let buffered: Vec<Span> = cut(&data, params).collect();
        let streamed: Vec<Span> = cut_stream(&data[..], params)
            .map(|r| r.map(|(span, _)| span))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(buffered, streamed);
    }

    #[test]
    fn most_cut_points_survive_a_mid_file_insert() {
        let a = pseudo_random(8 * 1024 * 1024, 7);
        let mut b = a.clone();
        let at = 4 * 1024 * 1024;
        for (i, byte) in (0..17u8).enumerate() {
            b.insert(at + i, byte);
        }

        let digest = |data: &[u8], span: &Span| -> [u8; 32] {
            let start = span.offset as usize;
            *blake3::hash(&data[start..start + span.length]).as_bytes()
        };
        let params_a = ChunkParams::from_len(a.len() as u64);
        let params_b = ChunkParams::from_len(b.len() as u64);
        assert_eq!(params_a, params_b);

        let spans_a: Vec<Span> = cut(&a, params_a).collect();
        let hashes_a: HashSet<_> = spans_a.iter().map(|s| digest(&a, s)).collect();
        let shared = cut(&b, params_b)
            .filter(|s| hashes_a.contains(&digest(&b, s)))
            .count();
        assert!(
            shared * 2 >= spans_a.len(),
            "only {shared} of {} chunks survived the edit",
            spans_a.len()
        );
    }

    #[test]
    fn spill_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let spill = SpillFile::new(dir.path());
            spill.create().unwrap().write_all(b"payload").unwrap();
            assert_eq!(spill.size().unwrap(), 7);
            spill.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
