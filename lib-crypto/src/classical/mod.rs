//! Classical (non-post-quantum) cryptographic primitives: Ed25519 signing
//! and the Ed25519-to-X25519 conversion used to derive session keys.

pub mod ed25519;
pub mod x25519;

pub use ed25519::{ed25519_keypair_from_seed, ed25519_verify, Ed25519KeyPair};
pub use x25519::{ed25519_private_to_x25519, ed25519_public_to_x25519};
