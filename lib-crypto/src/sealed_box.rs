//! `crypto_box_easy`-compatible sealed boxes: X25519 key agreement with
//! XSalsa20-Poly1305 AEAD, framed as `nonce || ciphertext || mac`.
//!
//! Nonces are 24-byte little-endian counters. A session only ever
//! increments its own outbound counter; the peer's inbound counter is
//! tracked separately and rejects any value it has already seen.

use crypto_box::aead::{Aead, AeadCore};
use crypto_box::{PublicKey, SalsaBox, SecretKey};
use rand::rngs::OsRng;

use crate::error::CryptoError;

pub const NONCE_LEN: usize = 24;
pub const MAC_LEN: usize = 16;

/// A 24-byte nonce used as a monotonic per-session counter.
///
/// Ordered as the little-endian integer `increment()` treats it as, not
/// as a lexicographic byte string: byte 0 is the least significant, so
/// comparison walks the array from the last byte down to the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nonce(pub [u8; NONCE_LEN]);

impl PartialOrd for Nonce {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Nonce {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.iter().rev().cmp(other.0.iter().rev())
    }
}

impl Nonce {
    pub fn zero() -> Self {
        Nonce([0u8; NONCE_LEN])
    }

    pub fn random() -> Self {
        let bytes: crypto_box::generic_array::GenericArray<u8, _> = SalsaBox::generate_nonce(&mut OsRng);
        let mut out = [0u8; NONCE_LEN];
        out.copy_from_slice(bytes.as_slice());
        Nonce(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != NONCE_LEN {
            return Err(CryptoError::InvalidKeyLength {
                expected: NONCE_LEN,
                got: bytes.len(),
            });
        }
        let mut out = [0u8; NONCE_LEN];
        out.copy_from_slice(bytes);
        Ok(Nonce(out))
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }

    /// Increments the little-endian counter in place, carrying across bytes.
    pub fn increment(&mut self) {
        for byte in self.0.iter_mut() {
            let (next, carry) = byte.overflowing_add(1);
            *byte = next;
            if !carry {
                break;
            }
        }
    }
}

/// A bidirectional sealed-box session between a local secret key and a
/// peer's public key.
pub struct SealedBox {
    b: SalsaBox,
}

impl SealedBox {
    pub fn new(local_secret: &[u8; 32], peer_public: &[u8; 32]) -> Self {
        let secret = SecretKey::from(*local_secret);
        let public = PublicKey::from(*peer_public);
        Self {
            b: SalsaBox::new(&public, &secret),
        }
    }

    /// Encrypts `plaintext` under `nonce`, returning `nonce || ciphertext || mac`.
    pub fn encrypt(&self, nonce: &Nonce, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce_ga = crypto_box::generic_array::GenericArray::from_slice(&nonce.0);
        let sealed = self
            .b
            .encrypt(nonce_ga, plaintext)
            .map_err(|_| CryptoError::DecryptionFailed)?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce.0);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Decrypts a `nonce || ciphertext || mac` frame, returning the nonce
    /// that was used (for replay tracking by the caller) and the plaintext.
    pub fn decrypt(&self, frame: &[u8]) -> Result<(Nonce, Vec<u8>), CryptoError> {
        if frame.len() < NONCE_LEN + MAC_LEN {
            return Err(CryptoError::FrameTooShort);
        }
        let nonce = Nonce::from_bytes(&frame[..NONCE_LEN])?;
        let nonce_ga = crypto_box::generic_array::GenericArray::from_slice(&nonce.0);

        let plaintext = self
            .b
            .decrypt(nonce_ga, &frame[NONCE_LEN..])
            .map_err(|_| CryptoError::DecryptionFailed)?;

        Ok((nonce, plaintext))
    }
}
