//! Node identity: an Ed25519 keypair addressed by the SHA-256 digest of its
//! public key, with X25519 derivation for session key agreement.

use lib_crypto::{
    ed25519_private_to_x25519, ed25519_verify, CryptoError, Ed25519KeyPair, Nonce, SealedBox,
};

use crate::id::Id;

/// Anything that can sign, verify, and establish encrypted sessions under a
/// stable [`Id`]. Implemented by [`NodeIdentity`] for the local node and can
/// be implemented for remote-signer variants in the future.
pub trait Identity {
    fn id(&self) -> Id;
    fn public_key(&self) -> [u8; 32];
    fn sign(&self, message: &[u8]) -> [u8; 64];
    fn verify(message: &[u8], signature: &[u8], public_key: &[u8]) -> Result<(), CryptoError>
    where
        Self: Sized,
    {
        ed25519_verify(message, signature, public_key)
    }
}

/// The local node's identity: an Ed25519 keypair plus the id derived from
/// its public key.
pub struct NodeIdentity {
    keypair: Ed25519KeyPair,
    id: Id,
}

impl NodeIdentity {
    pub fn generate() -> Self {
        let keypair = Ed25519KeyPair::generate();
        let id = Id::from_hashed(&keypair.public_bytes());
        Self { keypair, id }
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let keypair = Ed25519KeyPair::from_seed(seed);
        let id = Id::from_hashed(&keypair.public_bytes());
        Self { keypair, id }
    }

    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let keypair = Ed25519KeyPair::from_secret_bytes(bytes)?;
        let id = Id::from_hashed(&keypair.public_bytes());
        Ok(Self { keypair, id })
    }

    /// Derives the X25519 static secret used for sealed-box key agreement.
    pub fn x25519_secret(&self) -> Result<x25519_dalek::StaticSecret, CryptoError> {
        ed25519_private_to_x25519(self.keypair.secret_bytes())
    }

    /// Builds a bidirectional sealed-box session with a remote peer
    /// identified by its raw Ed25519 public key, routed through
    /// [`Id::to_encryption_key`] so the Ed25519→X25519 mapping and its
    /// curve-point validation live in exactly one place.
    pub fn create_crypto_context(&self, peer_public_key: &[u8]) -> Result<SealedBox, CryptoError> {
        let peer_id =
            Id::try_from_slice(peer_public_key).map_err(|_| CryptoError::InvalidKeyLength {
                expected: 32,
                got: peer_public_key.len(),
            })?;
        let peer_x25519 = peer_id
            .to_encryption_key()
            .map_err(|_| CryptoError::InvalidSignature)?;
        let local_x25519 = self.x25519_secret()?;
        Ok(SealedBox::new(&local_x25519.to_bytes(), &peer_x25519))
    }
}

impl Identity for NodeIdentity {
    fn id(&self) -> Id {
        self.id
    }

    fn public_key(&self) -> [u8; 32] {
        self.keypair.public_bytes()
    }

    fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.keypair.sign(message)
    }
}

/// Tracks the outbound and inbound nonce counters for one peer session,
/// rejecting replayed inbound frames.
pub struct CryptoContext {
    sealed: SealedBox,
    outbound_nonce: Nonce,
    highest_seen_inbound: Option<Nonce>,
}

impl CryptoContext {
    pub fn new(sealed: SealedBox) -> Self {
        Self {
            sealed,
            outbound_nonce: Nonce::random(),
            highest_seen_inbound: None,
        }
    }

    /// Encrypts and frames `plaintext`, advancing the local outbound counter.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let frame = self.sealed.encrypt(&self.outbound_nonce, plaintext)?;
        self.outbound_nonce.increment();
        Ok(frame)
    }

    /// Decrypts an inbound frame, rejecting nonces at or below the highest
    /// one already accepted from this peer.
    pub fn decrypt(&mut self, frame: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let (nonce, plaintext) = self.sealed.decrypt(frame)?;
        if let Some(highest) = self.highest_seen_inbound {
            if nonce <= highest {
                return Err(CryptoError::DuplicatedNonce);
            }
        }
        self.highest_seen_inbound = Some(nonce);
        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_derived_from_public_key() {
        let node = NodeIdentity::generate();
        assert_eq!(node.id(), Id::from_hashed(&node.public_key()));
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let node = NodeIdentity::generate();
        let message = b"find_node request";
        let sig = node.sign(message);
        NodeIdentity::verify(message, &sig, &node.public_key()).unwrap();
    }

    #[test]
    fn crypto_context_rejects_replayed_nonce() {
        let alice = NodeIdentity::generate();
        let bob = NodeIdentity::generate();

        let alice_box = alice.create_crypto_context(&bob.public_key()).unwrap();
        let bob_box = bob.create_crypto_context(&alice.public_key()).unwrap();

        let mut alice_ctx = CryptoContext::new(alice_box);
        let mut bob_ctx = CryptoContext::new(bob_box);

        let frame = alice_ctx.encrypt(b"hello").unwrap();
        let plaintext = bob_ctx.decrypt(&frame).unwrap();
        assert_eq!(plaintext, b"hello");

        let replayed = bob_ctx.decrypt(&frame);
        assert!(matches!(replayed, Err(CryptoError::DuplicatedNonce)));
    }
}
