//! Body digests for stored response snapshots.

use sha2::{Digest, Sha256};

/// SHA-256 of a response body, hex encoded.
pub fn body_digest(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hex::encode(hasher.finalize())
}
