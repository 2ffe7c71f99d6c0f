//! Cache freshness relative to the source image.
//!
//! Freshness is a modification-time heuristic, not a content hash: a source
//! that is rewritten without its mtime moving past the cache's is reported
//! as fresh.

use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;

use crate::error::{CacheOp, Error};

/// State of a cache file relative to its source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// The cache exists and is at least as new as the source
    Fresh,
    /// The source was modified after the cache was written
    Stale,
    /// No cache file exists yet
    Absent,
}

impl CacheStatus {
    /// Whether the cache must be (re)created before serving tiles.
    #[inline]
    pub fn needs_update(self) -> bool {
        !matches!(self, CacheStatus::Fresh)
    }

    pub const fn name(self) -> &'static str {
        match self {
            CacheStatus::Fresh => "fresh",
            CacheStatus::Stale => "stale",
            CacheStatus::Absent => "absent",
        }
    }
}

/// Classify the cache at `cache_path` against the source at `source_path`.
///
/// The source must exist. A missing cache is [`CacheStatus::Absent`]; any
/// other failure to stat the cache is an error. Equal timestamps count as
/// fresh.
pub fn check_status(source_path: &Path, cache_path: &Path) -> Result<CacheStatus, Error> {
    let source = fs::metadata(source_path).map_err(|e| Error::ImageStat {
        path: source_path.to_path_buf(),
        source: e,
    })?;

    let cache = match fs::metadata(cache_path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(CacheStatus::Absent),
        Err(e) => return Err(Error::cache_io(CacheOp::Stat, cache_path, e)),
    };

    let source_mtime = source.modified().map_err(|e| Error::ImageStat {
        path: source_path.to_path_buf(),
        source: e,
    })?;
    let cache_mtime = cache
        .modified()
        .map_err(|e| Error::cache_io(CacheOp::Stat, cache_path, e))?;

    if source_mtime > cache_mtime {
        Ok(CacheStatus::Stale)
    } else {
        Ok(CacheStatus::Fresh)
    }
}

// =============================================================================
// Tests
// =============================================================================
