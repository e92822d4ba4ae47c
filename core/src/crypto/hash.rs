//! # Hashing Utilities
//!
//! SHA-256 is the only digest the client core needs: transaction ids,
//! proposal hashes carried in envelopes, and endorsement payload
//! comparisons all use it, because that is what the peers compute on their
//! side.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of the input data as a fixed-size array.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Hash several byte slices as if they were concatenated, without
/// allocating the concatenation.
pub fn sha256_parts(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Hex-encoded SHA-256.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}
