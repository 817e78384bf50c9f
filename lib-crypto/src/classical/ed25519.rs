//! Ed25519 signing keypairs.
//!
//! The node identifier's private key is always an Ed25519 signing key;
//! every other key type in the system (X25519 session keys) is derived
//! from it rather than generated independently.

use ed25519_dalek::{Signature as Ed25519Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;
use crate::traits::ZeroizingKey;

/// An Ed25519 signing keypair.
///
/// `secret` is zeroized on drop; `public` is not sensitive.
#[derive(ZeroizeOnDrop)]
pub struct Ed25519KeyPair {
    #[zeroize(skip)]
    public: [u8; 32],
    secret: [u8; 32],
}

impl ZeroizingKey for Ed25519KeyPair {}

impl Ed25519KeyPair {
    /// Generates a new keypair from the OS RNG.
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        let kp = Self::from_seed(&seed);
        seed.zeroize();
        kp
    }

    /// Derives a keypair from a 32-byte seed, as used when restoring a node
    /// identity from persisted key material.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key();
        Self {
            public: verifying_key.to_bytes(),
            secret: signing_key.to_bytes(),
        }
    }

    /// Reconstructs a keypair from its raw 32-byte secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                got: bytes.len(),
            });
        }
        let mut secret = [0u8; 32];
        secret.copy_from_slice(bytes);
        Ok(Self::from_seed(&secret))
    }

    pub fn public_bytes(&self) -> [u8; 32] {
        self.public
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret
    }

    fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.secret)
    }

    /// Signs `message`, returning the 64-byte detached signature.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key().sign(message).to_bytes()
    }
}

/// Verifies a detached Ed25519 signature against a raw public key.
pub fn ed25519_verify(
    message: &[u8],
    signature: &[u8],
    public_key: &[u8],
) -> Result<(), CryptoError> {
    if signature.len() != 64 {
        return Err(CryptoError::InvalidSignatureLength(signature.len()));
    }
    if public_key.len() != 32 {
        return Err(CryptoError::InvalidKeyLength {
            expected: 32,
            got: public_key.len(),
        });
    }

    let sig = Ed25519Signature::try_from(signature).map_err(|_| CryptoError::InvalidSignature)?;

    let mut pk_bytes = [0u8; 32];
    pk_bytes.copy_from_slice(public_key);
    let verifying_key =
        VerifyingKey::from_bytes(&pk_bytes).map_err(|_| CryptoError::InvalidSignature)?;

    verifying_key
        .verify(message, &sig)
        .map_err(|_| CryptoError::InvalidSignature)
}

/// Convenience wrapper over [`Ed25519KeyPair::from_seed`], matching the
/// free-function style the rest of the crate's public API uses.
pub fn ed25519_keypair_from_seed(seed: &[u8; 32]) -> Ed25519KeyPair {
    Ed25519KeyPair::from_seed(seed)
}

/// Validates that `bytes` decode to a point on the curve, i.e. are usable
/// as an Ed25519 public key.
pub fn ed25519_validate_public_key(bytes: &[u8; 32]) -> Result<(), CryptoError> {
    VerifyingKey::from_bytes(bytes)
        .map(|_| ())
        .map_err(|_| CryptoError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrip() {
        let kp = Ed25519KeyPair::generate();
        let message = b"boson node identifier";

        let signature = kp.sign(message);
        ed25519_verify(message, &signature, &kp.public_bytes()).unwrap();
    }

    #[test]
    fn wrong_message_fails_verification() {
        let kp = Ed25519KeyPair::generate();
        let signature = kp.sign(b"correct message");

        let err = ed25519_verify(b"tampered message", &signature, &kp.public_bytes());
        assert!(err.is_err());
    }

    #[test]
    fn same_seed_produces_same_keys() {
        let seed = [7u8; 32];
        let a = Ed25519KeyPair::from_seed(&seed);
        let b = Ed25519KeyPair::from_seed(&seed);

        assert_eq!(a.public_bytes(), b.public_bytes());
        assert_eq!(a.secret_bytes(), b.secret_bytes());
    }

    #[test]
    fn rejects_short_signature() {
        let kp = Ed25519KeyPair::generate();
        let err = ed25519_verify(b"msg", &[0u8; 10], &kp.public_bytes());
        assert!(matches!(err, Err(CryptoError::InvalidSignatureLength(10))));
    }
}
