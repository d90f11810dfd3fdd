//! SHA-256 fingerprints for change detection.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Compute the SHA-256 checksum of a string, hex-encoded
pub fn compute_checksum(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Compute a model fingerprint over its raw SQL plus the sorted config map.
///
/// The map is iterated in key order (BTreeMap), so the fingerprint is stable
/// across platforms and insertion orders.
pub fn fingerprint(raw_sql: &str, config: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_sql.as_bytes());
    hasher.update([0u8]);
    for (key, value) in config {
        hasher.update(key.as_bytes());
        hasher.update([b'=']);
        hasher.update(value.as_bytes());
        hasher.update([b'\n']);
    }
    format!("{:x}", hasher.finalize())
}
