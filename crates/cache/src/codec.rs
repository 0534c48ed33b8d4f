//! Reversible on-disk encoding for cache entries
//!
//! Entries pass through standard base64 before hitting disk. This is an
//! encoding step, not a confidentiality mechanism: anyone holding the file
//! can reverse it without a key. Genuine confidentiality would require an
//! authenticated encryption codec with the nonce stored alongside the
//! ciphertext.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Encode a serialized entry for storage.
pub(crate) fn encode(plain: &[u8]) -> Vec<u8> {
    STANDARD.encode(plain).into_bytes()
}

/// Reverse [`encode`]. Fails on bytes that are not valid base64, which the
/// cache treats as a corrupt entry.
pub(crate) fn decode(raw: &[u8]) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(raw)
}
