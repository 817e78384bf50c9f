//! Peer announcements: what a node publishes about a service endpoint it
//! hosts, keyed by an id that mixes in the endpoint so republishing from a
//! new address naturally supersedes the old announcement.
//!
//! Grounded in the teacher's `DhtPeerIdentity` (unified peer identity struct
//! keyed by node id + device), generalized here to the fingerprint-based
//! current schema rather than the legacy `(id, node_id)` one.

use serde::{Deserialize, Serialize};

use crate::id::Id;

/// The `(id, fingerprint)` compound key's second half: a 64-bit hash of
/// `node_id || endpoint`, permitting many co-existing announcements per id.
pub type Fingerprint = u64;

/// An announcement that peer `id` is reachable at `addr`, relayed by
/// intermediary `node_id`. Signed twice: `peer_signature` by the peer's own
/// key attests the peer agreed to be announced; `node_signature` by the
/// announcing node's key attests the node agreed to relay it. For a node
/// announcing itself, both signers are the same identity.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: Id,
    pub node_id: Id,
    pub addr: std::net::SocketAddr,
    pub nonce: [u8; 24],
    pub sequence_number: u32,
    pub extra_data: Option<Vec<u8>>,
    pub peer_signature: [u8; 64],
    pub node_signature: [u8; 64],
}

impl PeerInfo {
    /// The fingerprint this announcement is stored under. Two announcements
    /// of the same `id` at different addresses (or relayed by different
    /// nodes) land at different fingerprints and coexist; republishing the
    /// same `(node_id, addr)` pair overwrites.
    pub fn fingerprint(node_id: &Id, addr: &std::net::SocketAddr) -> Fingerprint {
        let digest = Id::from_hashed(
            &[node_id.as_bytes().as_slice(), addr.to_string().as_bytes()].concat(),
        );
        u64::from_be_bytes(digest.as_bytes()[..8].try_into().expect("8 bytes"))
    }

    /// Builds and signs an announcement that `peer_identity` is reachable at
    /// `addr`, relayed by `node_identity`. For a node announcing itself,
    /// pass the same identity for both.
    pub fn create(
        peer_identity: &crate::identity::NodeIdentity,
        node_identity: &crate::identity::NodeIdentity,
        addr: std::net::SocketAddr,
        sequence_number: u32,
        extra_data: Option<Vec<u8>>,
    ) -> Self {
        use crate::identity::Identity as _;

        let id = peer_identity.id();
        let node_id = node_identity.id();
        let nonce = *lib_crypto::Nonce::random().as_bytes();

        let peer_payload =
            Self::peer_payload(&id, &node_id, &addr, &nonce, sequence_number, &extra_data);
        let peer_signature = peer_identity.sign(&peer_payload);

        let node_payload = Self::node_payload(
            &peer_signature,
            &id,
            &node_id,
            &addr,
            &nonce,
            sequence_number,
            &extra_data,
        );
        let node_signature = node_identity.sign(&node_payload);

        PeerInfo {
            id,
            node_id,
            addr,
            nonce,
            sequence_number,
            extra_data,
            peer_signature,
            node_signature,
        }
    }

    fn peer_payload(
        id: &Id,
        node_id: &Id,
        addr: &std::net::SocketAddr,
        nonce: &[u8; 24],
        sequence_number: u32,
        extra_data: &Option<Vec<u8>>,
    ) -> [u8; 32] {
        lib_crypto::sha256_multiple(&[
            id.as_bytes().as_slice(),
            node_id.as_bytes().as_slice(),
            addr.to_string().as_bytes(),
            nonce,
            &sequence_number.to_be_bytes(),
            extra_data.as_deref().unwrap_or(&[]),
        ])
    }

    fn node_payload(
        peer_signature: &[u8; 64],
        id: &Id,
        node_id: &Id,
        addr: &std::net::SocketAddr,
        nonce: &[u8; 24],
        sequence_number: u32,
        extra_data: &Option<Vec<u8>>,
    ) -> [u8; 32] {
        lib_crypto::sha256_multiple(&[
            peer_signature,
            id.as_bytes().as_slice(),
            node_id.as_bytes().as_slice(),
            addr.to_string().as_bytes(),
            nonce,
            &sequence_number.to_be_bytes(),
            extra_data.as_deref().unwrap_or(&[]),
        ])
    }

    /// Verifies both signatures: `peer_signature` against `peer_public_key`
    /// and `node_signature` against `node_public_key`.
    pub fn verify(
        &self,
        peer_public_key: &[u8; 32],
        node_public_key: &[u8; 32],
    ) -> Result<(), lib_crypto::CryptoError> {
        let peer_payload = Self::peer_payload(
            &self.id,
            &self.node_id,
            &self.addr,
            &self.nonce,
            self.sequence_number,
            &self.extra_data,
        );
        lib_crypto::classical::ed25519::ed25519_verify(
            &peer_payload,
            &self.peer_signature,
            peer_public_key,
        )?;

        let node_payload = Self::node_payload(
            &self.peer_signature,
            &self.id,
            &self.node_id,
            &self.addr,
            &self.nonce,
            self.sequence_number,
            &self.extra_data,
        );
        lib_crypto::classical::ed25519::ed25519_verify(
            &node_payload,
            &self.node_signature,
            node_public_key,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::NodeIdentity;

    #[test]
    fn fingerprint_differs_by_address() {
        let node_id = Id::random();
        let a: std::net::SocketAddr = "127.0.0.1:8000".parse().unwrap();
        let b: std::net::SocketAddr = "127.0.0.1:8001".parse().unwrap();
        assert_ne!(
            PeerInfo::fingerprint(&node_id, &a),
            PeerInfo::fingerprint(&node_id, &b)
        );
    }

    #[test]
    fn self_announcement_create_and_verify_roundtrip() {
        let identity = NodeIdentity::generate();
        let addr: std::net::SocketAddr = "127.0.0.1:39001".parse().unwrap();

        let info = PeerInfo::create(&identity, &identity, addr, 1, None);
        info.verify(&identity.public_key(), &identity.public_key())
            .unwrap();
    }

    #[test]
    fn relayed_announcement_uses_both_keys() {
        let peer = NodeIdentity::generate();
        let relay = NodeIdentity::generate();
        let addr: std::net::SocketAddr = "127.0.0.1:39002".parse().unwrap();

        let info = PeerInfo::create(&peer, &relay, addr, 1, Some(b"extra".to_vec()));
        info.verify(&peer.public_key(), &relay.public_key()).unwrap();

        assert!(info.verify(&relay.public_key(), &relay.public_key()).is_err());
        assert!(info.verify(&peer.public_key(), &peer.public_key()).is_err());
    }

    #[test]
    fn verify_fails_for_wrong_signer() {
        let identity = NodeIdentity::generate();
        let other = NodeIdentity::generate();
        let addr: std::net::SocketAddr = "127.0.0.1:1".parse().unwrap();
        let info = PeerInfo::create(&identity, &identity, addr, 1, None);
        assert!(info
            .verify(&other.public_key(), &identity.public_key())
            .is_err());
    }
}
