use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::index::InvertedIndex;

pub const SEGMENT_VERSION: u32 = 1;

/// Sidecar metadata committed with every segment generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub version: u32,
    /// Documents in the store at commit time.
    pub doc_count: u64,
    pub created_at: String,
}

/// Layout of the segment directory: numbered generation directories plus a
/// `CURRENT` pointer file naming the committed one. Commits build the new
/// generation fully, then swap the pointer, so readers and crashes only
/// ever see a complete segment.
pub struct SegmentPaths {
    pub root: PathBuf,
}

impl SegmentPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn current(&self) -> PathBuf {
        self.root.join("CURRENT")
    }

    fn generation_dir(&self, generation: u64) -> PathBuf {
        self.root.join(format!("segment-{generation:06}"))
    }

    fn index_file(&self, generation: u64) -> PathBuf {
        self.generation_dir(generation).join("index.bin")
    }

    fn meta_file(&self, generation: u64) -> PathBuf {
        self.generation_dir(generation).join("meta.json")
    }
}

/// Whether a committed segment exists.
pub fn exists(paths: &SegmentPaths) -> bool {
    paths.current().is_file()
}

fn current_generation(paths: &SegmentPaths) -> Result<Option<u64>> {
    let raw = match fs::read_to_string(paths.current()) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    raw.trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|_| Error::CorruptSegment(format!("unparseable CURRENT pointer {raw:?}")))
}

/// Next unused generation number, derived from the directory listing so a
/// corrupt pointer file cannot make a commit overwrite an existing segment.
fn next_generation(paths: &SegmentPaths) -> Result<u64> {
    let entries = match fs::read_dir(&paths.root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    let mut max: Option<u64> = None;
    for entry in entries {
        let name = entry?.file_name();
        if let Some(gen) = name
            .to_str()
            .and_then(|n| n.strip_prefix("segment-"))
            .and_then(|n| n.parse::<u64>().ok())
        {
            max = Some(max.map_or(gen, |m| m.max(gen)));
        }
    }
    Ok(max.map_or(0, |m| m + 1))
}

/// Persist the index as a new generation and atomically repoint `CURRENT`
/// at it. Superseded generations are deleted best-effort after the swap.
pub fn commit(paths: &SegmentPaths, index: &InvertedIndex, doc_count: u64) -> Result<u64> {
    let generation = next_generation(paths)?;
    let dir = paths.generation_dir(generation);
    fs::create_dir_all(&dir)?;

    fs::write(paths.index_file(generation), bincode::serialize(index)?)?;
    let meta = SegmentMeta {
        version: SEGMENT_VERSION,
        doc_count,
        created_at: OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default(),
    };
    fs::write(paths.meta_file(generation), serde_json::to_string_pretty(&meta)?)?;

    let tmp = paths.root.join("CURRENT.tmp");
    fs::write(&tmp, format!("{generation}\n"))?;
    fs::rename(&tmp, paths.current())?;
    tracing::info!(generation, doc_count, "committed segment");

    for old in 0..generation {
        let dir = paths.generation_dir(old);
        if dir.is_dir() {
            let _ = fs::remove_dir_all(dir);
        }
    }
    Ok(generation)
}

/// Load the committed segment. A missing `CURRENT` pointer is
/// `IndexUnavailable`; a pointer naming an unreadable or structurally
/// inconsistent segment is `CorruptSegment`.
pub fn load(paths: &SegmentPaths) -> Result<(InvertedIndex, SegmentMeta)> {
    let generation = current_generation(paths)?.ok_or_else(|| {
        Error::IndexUnavailable(format!("no committed segment under {}", paths.root.display()))
    })?;

    let meta_raw = fs::read_to_string(paths.meta_file(generation))
        .map_err(|e| Error::CorruptSegment(format!("segment {generation}: meta unreadable: {e}")))?;
    let meta: SegmentMeta = serde_json::from_str(&meta_raw)
        .map_err(|e| Error::CorruptSegment(format!("segment {generation}: meta undecodable: {e}")))?;
    if meta.version != SEGMENT_VERSION {
        return Err(Error::CorruptSegment(format!(
            "segment {generation}: format version {} (expected {SEGMENT_VERSION})",
            meta.version
        )));
    }

    let bytes = fs::read(paths.index_file(generation))
        .map_err(|e| Error::CorruptSegment(format!("segment {generation}: index unreadable: {e}")))?;
    let index: InvertedIndex = bincode::deserialize(&bytes)
        .map_err(|e| Error::CorruptSegment(format!("segment {generation}: index undecodable: {e}")))?;
    index
        .check_consistency()
        .map_err(Error::CorruptSegment)?;

    tracing::debug!(generation, doc_count = meta.doc_count, "loaded segment");
    Ok((index, meta))
}
