//! File-backed key/value cache with TTL expiry

use crate::{Error, Result, codec, stats};
use crate::{CacheStats, StatsFilter};
use chrono::Utc;
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File extension for cache entry files
const CACHE_EXT: &str = "cache";

/// On-disk envelope for one cached value
///
/// Both fields are required: an envelope that deserializes without either is
/// corrupt and the backing file is removed eagerly.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    /// Absolute expiry as unix seconds; 0 means the entry never expires
    expiry: i64,
    /// The cached value
    data: serde_json::Value,
}

/// A cache of serializable values persisted as one file per key.
///
/// Keys are addressed by the hex SHA-256 digest of the key string; hash
/// collisions across distinct keys are an accepted limitation of the naming
/// scheme. Hit/miss counters live in a sidecar record next to the entries.
///
/// All operations are synchronous filesystem call sequences with no locking.
/// The design assumes cooperative single-process access to a given directory;
/// racing writers are last-writer-wins and a reader racing a deleter may see
/// a miss.
#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
    // Reserved for a future authenticated-encryption codec; the current
    // on-disk transform does not use it.
    #[allow(dead_code)]
    secret: SecretString,
}

impl FileCache {
    /// Open a cache rooted at `root`, creating the directory and an all-zero
    /// stats record if either is absent.
    ///
    /// The `secret` is retained but vestigial: the on-disk encoding is not a
    /// confidentiality mechanism (see the crate docs).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the directory cannot be created,
    /// or an I/O error if the initial stats record cannot be written.
    pub fn new(root: impl Into<PathBuf>, secret: impl Into<String>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            Error::configuration(format!(
                "failed to create cache directory {}: {e}",
                root.display()
            ))
        })?;
        if !stats::stats_path(&root).exists() {
            stats::store(&root, &CacheStats::default())?;
        }
        Ok(Self {
            root,
            secret: SecretString::from(secret.into()),
        })
    }

    /// Resolve the default per-user cache directory.
    ///
    /// Resolution order (first writable wins):
    /// 1) `FILECACHE_DIR` (explicit override)
    /// 2) `XDG_CACHE_HOME/filecache`
    /// 3) OS cache dir/filecache
    /// 4) TMPDIR/filecache (fallback)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when no candidate directory is
    /// writable.
    pub fn default_root() -> Result<PathBuf> {
        let candidates = RootCandidates {
            override_dir: std::env::var("FILECACHE_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            xdg_cache_home: std::env::var("XDG_CACHE_HOME")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            os_cache_dir: dirs::cache_dir(),
            temp_dir: std::env::temp_dir(),
        };
        root_from_candidates(candidates)
    }

    /// Directory holding the entry files and the stats record
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Look up `key`, returning the cached value if a live entry exists.
    ///
    /// Every miss condition resolves to `None` plus a miss-counter increment
    /// rather than an error: a missing file, an unreadable file, a corrupt
    /// envelope, an expired entry, or a value that does not decode into `T`.
    /// Corrupt and expired files are removed on the way out.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_at(key, Utc::now().timestamp())
    }

    fn get_at<T: DeserializeOwned>(&self, key: &str, now: i64) -> Option<T> {
        let path = self.entry_path(key);
        if !path.exists() {
            debug!(key, "cache miss: no entry");
            self.record_miss();
            return None;
        }
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(key, error = %e, "cache miss: entry unreadable");
                self.record_miss();
                return None;
            }
        };
        let plain = match codec::decode(&raw) {
            Ok(plain) => plain,
            Err(e) => {
                warn!(key, error = %e, "removing undecodable cache entry");
                let _ = fs::remove_file(&path);
                self.record_miss();
                return None;
            }
        };
        let entry: CacheEntry = match serde_json::from_slice(&plain) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, error = %e, "removing corrupt cache entry");
                let _ = fs::remove_file(&path);
                self.record_miss();
                return None;
            }
        };
        if entry.expiry != 0 && now >= entry.expiry {
            debug!(key, expiry = entry.expiry, "cache miss: entry expired");
            let _ = fs::remove_file(&path);
            self.record_miss();
            return None;
        }
        match serde_json::from_value(entry.data) {
            Ok(value) => {
                debug!(key, "cache hit");
                self.record_hit();
                Some(value)
            }
            Err(e) => {
                debug!(key, error = %e, "cache miss: value does not decode into requested type");
                self.record_miss();
                None
            }
        }
    }

    /// Store `value` under `key`, overwriting any previous entry.
    ///
    /// A `ttl_secs` of 0 means the entry never expires; any other value is an
    /// offset from the current time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an empty key,
    /// [`Error::Serialization`] if the value cannot be encoded, or an I/O
    /// error if the write fails. No file is written on failure paths.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) -> Result<()> {
        self.set_at(key, value, ttl_secs, Utc::now().timestamp())
    }

    fn set_at<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64, now: i64) -> Result<()> {
        if key.is_empty() {
            return Err(Error::invalid_argument("cache key must not be empty"));
        }
        let expiry = if ttl_secs == 0 {
            0
        } else {
            now.saturating_add(i64::try_from(ttl_secs).unwrap_or(i64::MAX))
        };
        let entry = CacheEntry {
            expiry,
            data: serde_json::to_value(value)
                .map_err(|e| Error::serialization(format!("failed to encode cache value: {e}")))?,
        };
        let plain = serde_json::to_vec(&entry)
            .map_err(|e| Error::serialization(format!("failed to serialize cache entry: {e}")))?;
        let path = self.entry_path(key);
        fs::write(&path, codec::encode(&plain)).map_err(|e| Error::io(e, &path, "write"))?;
        debug!(key, expiry, path = %path.display(), "stored cache entry");
        Ok(())
    }

    /// Remove the entry for `key`. Absence is not an error.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if an existing file cannot be deleted.
    pub fn remove(&self, key: &str) -> Result<()> {
        let path = self.entry_path(key);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(key, "removed cache entry");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(e, &path, "remove")),
        }
    }

    /// Remove every entry file in the cache directory.
    ///
    /// The stats record is left in place. A missing directory or a file that
    /// disappears mid-sweep is not an error.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be listed or an existing
    /// file cannot be deleted.
    pub fn clear(&self) -> Result<()> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::io(e, &self.root, "read_dir")),
        };
        for entry in entries.filter_map(std::result::Result::ok) {
            let path = entry.path();
            if !is_entry_file(&path) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::io(e, &path, "remove")),
            }
        }
        debug!(root = %self.root.display(), "cleared cache");
        Ok(())
    }

    /// Load the persisted hit/miss record for this cache directory.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the record exists but cannot be read.
    pub fn stats(&self) -> Result<CacheStats> {
        stats::load(&self.root)
    }

    /// Return just the hits or misses counter.
    ///
    /// # Errors
    ///
    /// Same as [`FileCache::stats`].
    pub fn stats_count(&self, filter: StatsFilter) -> Result<u64> {
        Ok(self.stats()?.count(filter))
    }

    /// Sum the byte length of every entry file; 0 when there are none.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if an existing directory cannot be listed.
    pub fn size_bytes(&self) -> Result<u64> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Error::io(e, &self.root, "read_dir")),
        };
        let mut total = 0u64;
        for entry in entries.filter_map(std::result::Result::ok) {
            let path = entry.path();
            if !is_entry_file(&path) {
                continue;
            }
            // Files can vanish between listing and stat; skip them
            if let Ok(meta) = fs::metadata(&path) {
                total = total.saturating_add(meta.len());
            }
        }
        Ok(total)
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.root
            .join(format!("{}.{CACHE_EXT}", hex::encode(digest)))
    }

    fn record_hit(&self) {
        if let Err(e) = stats::record_hit(&self.root) {
            warn!(error = %e, "failed to update cache stats");
        }
    }

    fn record_miss(&self) {
        if let Err(e) = stats::record_miss(&self.root) {
            warn!(error = %e, "failed to update cache stats");
        }
    }
}

/// Candidate directories for the default cache root
#[derive(Debug, Clone)]
struct RootCandidates {
    override_dir: Option<PathBuf>,
    xdg_cache_home: Option<PathBuf>,
    os_cache_dir: Option<PathBuf>,
    temp_dir: PathBuf,
}

fn root_from_candidates(inputs: RootCandidates) -> Result<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Some(dir) = inputs.override_dir.filter(|p| !p.as_os_str().is_empty()) {
        candidates.push(dir);
    }
    if let Some(xdg) = inputs.xdg_cache_home {
        candidates.push(xdg.join("filecache"));
    }
    if let Some(os_cache) = inputs.os_cache_dir {
        candidates.push(os_cache.join("filecache"));
    }
    candidates.push(inputs.temp_dir.join("filecache"));

    for path in candidates {
        // An existing directory may still be read-only; probe before
        // committing to it.
        if path.exists() {
            let probe = path.join(".write_probe");
            match fs::OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(&probe)
            {
                Ok(_) => {
                    let _ = fs::remove_file(&probe);
                    return Ok(path);
                }
                Err(_) => continue,
            }
        }
        if fs::create_dir_all(&path).is_ok() {
            return Ok(path);
        }
        // Permission denied or other errors - try next candidate
    }
    Err(Error::configuration(
        "failed to determine a writable cache directory",
    ))
}

fn is_entry_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == CACHE_EXT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(temp: &TempDir) -> FileCache {
        FileCache::new(temp.path(), "test-secret").expect("open cache")
    }

    fn entry_files(root: &Path) -> Vec<PathBuf> {
        fs::read_dir(root)
            .unwrap()
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| is_entry_file(p))
            .collect()
    }

    #[test]
    fn test_new_creates_directory_and_zero_stats() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("nested/cache");
        let cache = FileCache::new(&root, "secret").unwrap();

        assert!(root.is_dir());
        assert_eq!(cache.stats().unwrap(), CacheStats::default());
    }

    #[test]
    fn test_new_keeps_existing_stats() {
        let temp = TempDir::new().unwrap();
        let cache = open(&temp);
        assert!(cache.get::<String>("missing").is_none());

        // Re-opening must not reset the persisted counters
        let reopened = open(&temp);
        assert_eq!(reopened.stats().unwrap().misses, 1);
    }

    #[test]
    fn test_set_then_get_round_trips() {
        let temp = TempDir::new().unwrap();
        let cache = open(&temp);

        cache.set("greeting", &"hello".to_string(), 0).unwrap();
        assert_eq!(cache.get::<String>("greeting"), Some("hello".to_string()));
    }

    #[test]
    fn test_round_trips_structured_values() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Payload {
            id: u32,
            tags: Vec<String>,
        }

        let temp = TempDir::new().unwrap();
        let cache = open(&temp);
        let payload = Payload {
            id: 7,
            tags: vec!["a".into(), "b".into()],
        };

        cache.set("payload", &payload, 0).unwrap();
        assert_eq!(cache.get::<Payload>("payload"), Some(payload));
    }

    #[test]
    fn test_entry_filename_is_hex_digest() {
        let temp = TempDir::new().unwrap();
        let cache = open(&temp);
        cache.set("some key", &1u8, 0).unwrap();

        let files = entry_files(temp.path());
        assert_eq!(files.len(), 1);
        let stem = files[0].file_stem().unwrap().to_string_lossy();
        assert_eq!(stem.len(), 64);
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_expired_entry_is_removed_on_get() {
        let temp = TempDir::new().unwrap();
        let cache = open(&temp);

        cache.set_at("short", &"v".to_string(), 1, 1_000).unwrap();
        assert!(cache.get_at::<String>("short", 1_002).is_none());
        assert!(!cache.entry_path("short").exists());
        assert_eq!(cache.stats().unwrap().misses, 1);
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let temp = TempDir::new().unwrap();
        let cache = open(&temp);

        cache.set_at("edge", &"v".to_string(), 5, 1_000).unwrap();
        // Strictly before the expiry timestamp: still live
        assert_eq!(
            cache.get_at::<String>("edge", 1_004),
            Some("v".to_string())
        );
        // At the expiry timestamp: gone
        assert!(cache.get_at::<String>("edge", 1_005).is_none());
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let temp = TempDir::new().unwrap();
        let cache = open(&temp);

        cache.set_at("forever", &42i64, 0, 1_000).unwrap();
        assert_eq!(cache.get_at::<i64>("forever", i64::MAX - 1), Some(42));
    }

    #[test]
    fn test_miss_increments_only_miss_counter() {
        let temp = TempDir::new().unwrap();
        let cache = open(&temp);

        assert!(cache.get::<String>("absent").is_none());

        let stats = cache.stats().unwrap();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_hit_increments_only_hit_counter() {
        let temp = TempDir::new().unwrap();
        let cache = open(&temp);

        cache.set("present", &true, 0).unwrap();
        assert_eq!(cache.get::<bool>("present"), Some(true));

        let stats = cache.stats().unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_stats_count_filters() {
        let temp = TempDir::new().unwrap();
        let cache = open(&temp);

        cache.set("k", &1u8, 0).unwrap();
        assert_eq!(cache.get::<u8>("k"), Some(1));
        assert!(cache.get::<u8>("gone").is_none());
        assert!(cache.get::<u8>("also-gone").is_none());

        assert_eq!(cache.stats_count(StatsFilter::Hits).unwrap(), 1);
        assert_eq!(cache.stats_count(StatsFilter::Misses).unwrap(), 2);
    }

    #[test]
    fn test_remove_clears_one_key_only() {
        let temp = TempDir::new().unwrap();
        let cache = open(&temp);

        cache.set("a", &"one".to_string(), 0).unwrap();
        cache.set("b", &"two".to_string(), 0).unwrap();

        cache.remove("a").unwrap();
        assert!(cache.get::<String>("a").is_none());
        assert_eq!(cache.get::<String>("b"), Some("two".to_string()));
    }

    #[test]
    fn test_remove_absent_key_is_ok() {
        let temp = TempDir::new().unwrap();
        let cache = open(&temp);
        cache.remove("never-set").unwrap();
    }

    #[test]
    fn test_clear_removes_every_entry_but_keeps_stats() {
        let temp = TempDir::new().unwrap();
        let cache = open(&temp);

        for key in ["a", "b", "c"] {
            cache.set(key, &key.to_string(), 0).unwrap();
        }
        cache.clear().unwrap();

        for key in ["a", "b", "c"] {
            assert!(cache.get::<String>(key).is_none());
        }
        assert!(entry_files(temp.path()).is_empty());
        assert!(stats::stats_path(temp.path()).exists());
    }

    #[test]
    fn test_empty_key_is_rejected_without_writing() {
        let temp = TempDir::new().unwrap();
        let cache = open(&temp);

        let err = cache.set("", &"value".to_string(), 0).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
        assert!(entry_files(temp.path()).is_empty());
    }

    #[test]
    fn test_size_sums_entry_files() {
        let temp = TempDir::new().unwrap();
        let cache = open(&temp);

        cache.set("a", &"x".repeat(10), 0).unwrap();
        cache.set("b", &"y".repeat(100), 0).unwrap();

        let expected: u64 = entry_files(temp.path())
            .iter()
            .map(|p| fs::metadata(p).unwrap().len())
            .sum();
        assert!(expected > 0);
        assert_eq!(cache.size_bytes().unwrap(), expected);
    }

    #[test]
    fn test_size_is_zero_for_empty_cache() {
        let temp = TempDir::new().unwrap();
        let cache = open(&temp);
        assert_eq!(cache.size_bytes().unwrap(), 0);
    }

    #[test]
    fn test_size_is_zero_for_missing_directory() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("cache");
        let cache = FileCache::new(&root, "secret").unwrap();
        fs::remove_dir_all(&root).unwrap();
        assert_eq!(cache.size_bytes().unwrap(), 0);
    }

    #[test]
    fn test_undecodable_entry_is_evicted() {
        let temp = TempDir::new().unwrap();
        let cache = open(&temp);

        cache.set("k", &"v".to_string(), 0).unwrap();
        fs::write(cache.entry_path("k"), b"!!! not base64 !!!").unwrap();

        assert!(cache.get::<String>("k").is_none());
        assert!(!cache.entry_path("k").exists());
        assert_eq!(cache.stats().unwrap().misses, 1);
    }

    #[test]
    fn test_envelope_missing_field_is_evicted() {
        let temp = TempDir::new().unwrap();
        let cache = open(&temp);

        // Valid encoding, but the envelope lacks the data field
        fs::write(cache.entry_path("k"), codec::encode(br#"{"expiry":0}"#)).unwrap();

        assert!(cache.get::<String>("k").is_none());
        assert!(!cache.entry_path("k").exists());
    }

    #[test]
    fn test_overwrite_replaces_previous_value() {
        let temp = TempDir::new().unwrap();
        let cache = open(&temp);

        cache.set("k", &"old".to_string(), 0).unwrap();
        cache.set("k", &"new".to_string(), 0).unwrap();

        assert_eq!(cache.get::<String>("k"), Some("new".to_string()));
        assert_eq!(entry_files(temp.path()).len(), 1);
    }

    #[test]
    fn test_secret_is_redacted_from_debug() {
        let temp = TempDir::new().unwrap();
        let cache = open(&temp);
        let rendered = format!("{cache:?}");
        assert!(!rendered.contains("test-secret"));
    }

    #[test]
    fn root_candidates_prefer_override() {
        let temp = TempDir::new().unwrap();
        let override_dir = temp.path().join("override");
        let candidates = RootCandidates {
            override_dir: Some(override_dir.clone()),
            xdg_cache_home: Some(temp.path().join("xdg")),
            os_cache_dir: None,
            temp_dir: temp.path().to_path_buf(),
        };
        assert_eq!(root_from_candidates(candidates).unwrap(), override_dir);
    }

    #[test]
    fn root_candidates_fall_back_to_temp_dir() {
        let temp = TempDir::new().unwrap();
        let candidates = RootCandidates {
            override_dir: None,
            xdg_cache_home: None,
            os_cache_dir: None,
            temp_dir: temp.path().to_path_buf(),
        };
        let root = root_from_candidates(candidates).unwrap();
        assert_eq!(root, temp.path().join("filecache"));
        assert!(root.is_dir());
    }
}
