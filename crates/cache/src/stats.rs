//! Persisted hit/miss statistics
//!
//! One record per cache directory, stored as JSON next to the entry files and
//! updated via whole-file read-modify-write. There is no cross-process
//! atomicity: concurrent updates may lose increments, which callers accept in
//! exchange for zero coordination.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub(crate) const STATS_FILE: &str = "cache_stats.json";

/// Aggregate hit/miss counters for one cache directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of gets that returned a live entry
    pub hits: u64,
    /// Number of gets that found nothing usable
    pub misses: u64,
}

/// Selects a single counter from [`CacheStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsFilter {
    /// The hit counter
    Hits,
    /// The miss counter
    Misses,
}

impl CacheStats {
    /// Return the counter selected by `filter`
    #[must_use]
    pub fn count(&self, filter: StatsFilter) -> u64 {
        match filter {
            StatsFilter::Hits => self.hits,
            StatsFilter::Misses => self.misses,
        }
    }
}

pub(crate) fn stats_path(root: &Path) -> PathBuf {
    root.join(STATS_FILE)
}

/// Load the stats record for a cache directory.
///
/// A missing file reads as all zeros; an unparseable file also resets to
/// zeros rather than wedging every subsequent get.
pub(crate) fn load(root: &Path) -> Result<CacheStats> {
    let path = stats_path(root);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(CacheStats::default()),
        Err(e) => return Err(Error::io(e, &path, "read")),
    };
    Ok(serde_json::from_str(&content).unwrap_or_default())
}

pub(crate) fn store(root: &Path, stats: &CacheStats) -> Result<()> {
    let path = stats_path(root);
    let json = serde_json::to_string_pretty(stats)
        .map_err(|e| Error::serialization(format!("failed to serialize cache stats: {e}")))?;
    fs::write(&path, json).map_err(|e| Error::io(e, &path, "write"))
}

pub(crate) fn record_hit(root: &Path) -> Result<()> {
    let mut stats = load(root)?;
    stats.hits += 1;
    store(root, &stats)
}

pub(crate) fn record_miss(root: &Path) -> Result<()> {
    let mut stats = load(root)?;
    stats.misses += 1;
    store(root, &stats)
}
