//! File-backed key/value cache with TTL expiry and hit/miss statistics
//!
//! This crate provides a minimal persistent cache:
//! - One file per entry, addressed by the SHA-256 digest of the key
//! - Optional time-to-live with opportunistic removal of expired entries
//! - Hit/miss counters persisted in a sidecar record per cache directory
//! - A reversible on-disk encoding applied to stored payloads
//!
//! # Overview
//!
//! [`FileCache`] fronts a single directory. `set` serializes a value into an
//! envelope carrying its absolute expiry, encodes it, and writes one file;
//! `get` reverses the pipeline and treats every failure along the way as a
//! recoverable miss rather than an error. Corrupt and expired files are
//! removed as part of the miss path.
//!
//! # Security
//!
//! The on-disk encoding is not a confidentiality mechanism: anyone holding an
//! entry file can reverse it. The secret accepted by [`FileCache::new`] is
//! reserved for a future authenticated-encryption codec (with the nonce
//! stored alongside the ciphertext) and does not affect the stored bytes
//! today.

mod cache;
mod codec;
mod error;
mod stats;

// Re-export error types at crate root
pub use error::{Error, Result};

// Re-export main types
pub use cache::FileCache;
pub use stats::{CacheStats, StatsFilter};
