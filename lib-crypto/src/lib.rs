//! Boson cryptography foundation module
//!
//! Ed25519 signing, Ed25519-to-X25519 key conversion, crypto_box_easy-compatible
//! sealed boxes, and the SHA-256 hashing primitives the rest of the crate family
//! builds on.

pub mod classical;
pub mod error;
pub mod hashing;
pub mod random;
pub mod sealed_box;
pub mod traits;

pub use classical::ed25519::{
    ed25519_keypair_from_seed, ed25519_validate_public_key, ed25519_verify, Ed25519KeyPair,
};
pub use classical::x25519::{ed25519_private_to_x25519, ed25519_public_to_x25519};
pub use error::CryptoError;
pub use hashing::{sha256, sha256_multiple};
pub use random::SecureRng;
pub use sealed_box::{Nonce, SealedBox, MAC_LEN, NONCE_LEN};
pub use traits::{SecureKey, ZeroizingKey};
