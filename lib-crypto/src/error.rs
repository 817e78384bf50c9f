//! Crypto error taxonomy
//!
//! Mirrors the `CryptoError` kind from the identity/transport error taxonomy:
//! box decryption failure and duplicate inbound nonce are the two cases the
//! RPC layer must be able to match on explicitly.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("invalid signature length: expected 64, got {0}")]
    InvalidSignatureLength(usize),

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("sealed box decryption failed")]
    DecryptionFailed,

    #[error("duplicated nonce")]
    DuplicatedNonce,

    #[error("frame shorter than nonce+mac minimum")]
    FrameTooShort,
}
