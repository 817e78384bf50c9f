//! Tracks the address and public key of every peer this node has
//! bootstrapped from or heard an announcement about. Backs the RPC
//! layer's [`lib_rpc::PeerKeyResolver`] and lets the façade look up where
//! to send a call.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::RwLock;

use lib_identity::Id;
use lib_rpc::PeerKeyResolver;

#[derive(Clone, Copy)]
struct Route {
    public_key: [u8; 32],
    addr: SocketAddr,
}

#[derive(Default)]
pub struct PeerDirectory {
    routes: RwLock<HashMap<Id, Route>>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: Id, public_key: [u8; 32], addr: SocketAddr) {
        self.routes
            .write()
            .expect("lock poisoned")
            .insert(id, Route { public_key, addr });
    }

    pub fn addr_for(&self, id: &Id) -> Option<SocketAddr> {
        self.routes.read().expect("lock poisoned").get(id).map(|r| r.addr)
    }

    pub fn any_peer(&self) -> Option<(Id, SocketAddr)> {
        self.routes
            .read()
            .expect("lock poisoned")
            .iter()
            .next()
            .map(|(id, route)| (*id, route.addr))
    }
}

impl PeerKeyResolver for PeerDirectory {
    fn public_key_for(&self, id: &Id) -> Option<[u8; 32]> {
        self.routes
            .read()
            .expect("lock poisoned")
            .get(id)
            .map(|r| r.public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_resolve_roundtrip() {
        let directory = PeerDirectory::new();
        let id = Id::random();
        let key = [7u8; 32];
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();

        directory.insert(id, key, addr);
        assert_eq!(directory.addr_for(&id), Some(addr));
        assert_eq!(directory.public_key_for(&id), Some(key));
    }

    #[test]
    fn unknown_peer_resolves_to_none() {
        let directory = PeerDirectory::new();
        assert_eq!(directory.addr_for(&Id::random()), None);
    }
}
