//! Identity and value model error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid id length: expected 32 bytes, got {0}")]
    InvalidIdLength(usize),

    #[error("invalid base58 id: {0}")]
    InvalidBase58(String),

    #[error("invalid hex id: {0}")]
    InvalidHex(String),

    #[error("invalid did:boson uri: {0}")]
    InvalidDidUri(String),

    #[error(transparent)]
    Crypto(#[from] lib_crypto::CryptoError),
}

#[derive(Debug, Error)]
pub enum ValueError {
    #[error("immutable value data hash does not match its id")]
    ImmutableHashMismatch,

    #[error("signed value signature verification failed")]
    InvalidSignature,

    #[error("value exceeds the maximum permitted size of {max} bytes (got {got})")]
    TooLarge { max: usize, got: usize },

    #[error(transparent)]
    Crypto(#[from] lib_crypto::CryptoError),
}

#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("canonical encoding failed: {0}")]
    Encoding(String),

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("missing required claim: {0}")]
    MissingClaim(String),

    #[error("object is not yet valid")]
    BeforeValidPeriod,

    #[error("object has expired")]
    Expired,

    #[error(transparent)]
    Crypto(#[from] lib_crypto::CryptoError),
}
