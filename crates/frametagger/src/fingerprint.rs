use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of the raw uploaded bytes.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
