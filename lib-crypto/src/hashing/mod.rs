//! SHA-256 hashing primitives.
//!
//! Identifiers, value immutability, and signature pre-hashing all use
//! SHA-256 so that distances in the keyspace and data digests share one
//! hash function.

use sha2::{Digest, Sha256};

/// Hashes `data` with SHA-256.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hashes the concatenation of `segments` with SHA-256, without actually
/// concatenating them into one buffer first.
pub fn sha256_multiple(segments: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for segment in segments {
        hasher.update(segment);
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let data = b"hello world";
        assert_eq!(sha256(data), sha256(data));
    }

    #[test]
    fn multiple_matches_concatenated() {
        let a = sha256_multiple(&[b"hello", b" ", b"world"]);
        let b = sha256(b"hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn known_vector() {
        // sha256("") per FIPS 180-4 test vectors
        let digest = sha256(b"");
        assert_eq!(
            hex::encode(digest),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85"
        );
    }
}
