//! Ed25519 to X25519 conversion.
//!
//! The DHT signs with Ed25519 but negotiates encrypted sessions with X25519,
//! so every peer's signing key doubles as its key-agreement key via the
//! standard birational map between edwards25519 and curve25519.

use curve25519_dalek::edwards::CompressedEdwardsY;
use sha2::{Digest, Sha512};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret as X25519StaticSecret};

use crate::error::CryptoError;

/// Converts an Ed25519 public key to its X25519 Montgomery-form equivalent.
pub fn ed25519_public_to_x25519(public_key: &[u8]) -> Result<X25519PublicKey, CryptoError> {
    if public_key.len() != 32 {
        return Err(CryptoError::InvalidKeyLength {
            expected: 32,
            got: public_key.len(),
        });
    }
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(public_key);

    let compressed = CompressedEdwardsY(bytes);
    let point = compressed
        .decompress()
        .ok_or(CryptoError::InvalidKeyLength {
            expected: 32,
            got: public_key.len(),
        })?;

    Ok(X25519PublicKey::from(point.to_montgomery().to_bytes()))
}

/// Converts an Ed25519 secret key (the 32-byte seed) to its X25519
/// equivalent by hashing the seed the same way Ed25519 itself does
/// (SHA-512, clamped low 32 bytes) to derive the Montgomery scalar.
pub fn ed25519_private_to_x25519(secret_key: &[u8]) -> Result<X25519StaticSecret, CryptoError> {
    if secret_key.len() != 32 {
        return Err(CryptoError::InvalidKeyLength {
            expected: 32,
            got: secret_key.len(),
        });
    }

    let mut hasher = Sha512::new();
    hasher.update(secret_key);
    let digest = hasher.finalize();

    let mut scalar_bytes = [0u8; 32];
    scalar_bytes.copy_from_slice(&digest[..32]);

    Ok(X25519StaticSecret::from(scalar_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classical::ed25519::Ed25519KeyPair;

    #[test]
    fn conversion_preserves_key_agreement() {
        let alice = Ed25519KeyPair::generate();
        let bob = Ed25519KeyPair::generate();

        let alice_x_secret = ed25519_private_to_x25519(alice.secret_bytes()).unwrap();
        let bob_x_public = ed25519_public_to_x25519(&bob.public_bytes()).unwrap();
        let bob_x_secret = ed25519_private_to_x25519(bob.secret_bytes()).unwrap();
        let alice_x_public = ed25519_public_to_x25519(&alice.public_bytes()).unwrap();

        let shared_a = alice_x_secret.diffie_hellman(&bob_x_public);
        let shared_b = bob_x_secret.diffie_hellman(&alice_x_public);

        assert_eq!(shared_a.as_bytes(), shared_b.as_bytes());
    }

    #[test]
    fn rejects_wrong_length_key() {
        let err = ed25519_public_to_x25519(&[0u8; 10]);
        assert!(err.is_err());
    }
}
