//! Domain-separated blake3 hashing helpers.
//!
//! Every content address in the workspace (request fingerprints, proof ids,
//! Merkle leaves and nodes) goes through [`domain_hash`] so that values hashed
//! for one purpose can never collide with values hashed for another.

use blake3::Hasher;
use serde::Serialize;

/// Hash `parts` under `domain`, length-prefixing every part.
pub fn domain_hash(domain: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Hasher::new();
    hasher.update(&(domain.len() as u64).to_be_bytes());
    hasher.update(domain);
    for part in parts {
        hasher.update(&(part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// Canonical JSON bytes of `value`.
///
/// `serde_json` maps are ordered, so two structurally equal values always
/// produce identical bytes.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Vec<u8> {
    serde_json::to_value(value)
        .and_then(|v| serde_json::to_vec(&v))
        .unwrap_or_default()
}

/// Lowercase hex of a 32-byte digest.
pub fn to_hex(bytes: &[u8; 32]) -> String {
    hex::encode(bytes)
}

/// Parse a 32-byte digest from hex.
pub fn from_hex(s: &str) -> Option<[u8; 32]> {
    let bytes = hex::decode(s.trim_start_matches("0x")).ok()?;
    bytes.try_into().ok()
}
