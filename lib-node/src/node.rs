//! The consumer-facing façade: one struct tying identity, storage, and
//! the RPC transport together behind `start`/`stop`/`bootstrap` and the
//! DHT operations. The actual iterative convergence a real lookup needs
//! (querying successively closer peers until no closer one responds) is
//! out of scope here — each non-local operation below is a single-hop
//! request to an already-known peer, matching the façade's "contract
//! only" charter.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use lib_identity::{Fingerprint, Id, NodeIdentity, PeerInfo, Value};
use lib_rpc::{CallState, Message, Method, RpcServer};
use lib_storage::{DataStorage, Lifecycle};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

use crate::config::{BootstrapNode, NodeConfig};
use crate::directory::PeerDirectory;
use crate::error::NodeError;
use crate::handler::NodeRequestHandler;
use crate::wire::{
    AnnouncePeerParams, FindNodeParams, FindPeerParams, FindValueParams, PeersResponse,
    StoreValueParams, ValueResponse,
};

/// Directs how a lookup should be satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOption {
    /// Answer purely from local storage.
    Local,
    /// Ask any one known peer, accepting its answer as-is.
    Arbitrary,
    /// Prefer a peer already known to be reachable and low-latency.
    Optimistic,
    /// Require a peer's answer to agree with local storage before
    /// returning it.
    Conservative,
}

const CALL_POLL_INTERVAL_MS: u64 = 10;

pub struct Node<S: DataStorage + 'static> {
    identity: Arc<NodeIdentity>,
    config: NodeConfig,
    storage: Arc<S>,
    directory: Arc<PeerDirectory>,
    rpc: Arc<RpcServer>,
    purge_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl<S: DataStorage + 'static> Node<S> {
    pub async fn start(config: NodeConfig, storage: Arc<S>) -> Result<Arc<Self>, NodeError> {
        let identity = Arc::new(
            NodeIdentity::from_secret_bytes(&config.private_key)
                .map_err(|e| NodeError::BosonError(e.to_string()))?,
        );
        let directory = Arc::new(PeerDirectory::new());
        for bootstrap in &config.bootstraps {
            directory.insert(bootstrap.id, bootstrap.public_key, bootstrap.addr);
        }

        let bind_addr = SocketAddr::new(config.host4.into(), config.port);
        let handler = Arc::new(NodeRequestHandler::new(Arc::clone(&storage), config.clone()));

        let rpc = RpcServer::bind(
            bind_addr,
            Arc::clone(&identity),
            Arc::clone(&directory) as Arc<dyn lib_rpc::PeerKeyResolver>,
            handler,
            config.enable_developer_mode,
        )
        .await?;

        let node = Arc::new(Node {
            identity,
            config,
            storage,
            directory,
            rpc,
            purge_task: std::sync::Mutex::new(None),
        });

        let purge_node = Arc::clone(&node);
        let handle = tokio::spawn(async move { purge_node.purge_loop().await });
        *node.purge_task.lock().expect("lock poisoned") = Some(handle);

        Ok(node)
    }

    pub fn stop(&self) {
        if let Some(handle) = self.purge_task.lock().expect("lock poisoned").take() {
            handle.abort();
        }
    }

    async fn purge_loop(self: Arc<Self>) {
        let mut ticker = interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            if let Err(err) = self.storage.purge(Utc::now()).await {
                tracing::warn!(error = %err, "purge failed");
            }
        }
    }

    pub fn id(&self) -> Id {
        self.identity.id()
    }

    /// `None` unless `enable_metrics` was set: the RPC layer pays the
    /// (negligible) cost of the counters either way, but a node that
    /// didn't ask for metrics doesn't get to read them.
    pub fn metrics(&self) -> Option<lib_rpc::MetricsSnapshot> {
        self.config.enable_metrics.then(|| self.rpc.metrics())
    }

    /// Read-only reputation score for `peer`, derived from past call
    /// outcomes; `None` unless `enable_metrics` was set.
    pub fn reputation(&self, peer: &Id) -> Option<i64> {
        self.config.enable_metrics.then(|| self.rpc.reputation(peer))
    }

    /// Registers bootstrap nodes' routes so subsequent calls can reach
    /// them; does not itself perform any lookup.
    pub fn bootstrap(&self, nodes: &[BootstrapNode]) {
        for node in nodes {
            self.directory.insert(node.id, node.public_key, node.addr);
        }
    }

    fn pick_peer(&self, option: LookupOption) -> Option<(Id, SocketAddr)> {
        match option {
            LookupOption::Local => None,
            _ => self.directory.any_peer(),
        }
    }

    async fn await_call(&self, call: Arc<lib_rpc::PendingCall>) -> Result<Vec<u8>, NodeError> {
        loop {
            match call.state() {
                CallState::Responded => return Ok(call.response_body().unwrap_or_default()),
                CallState::Timeout | CallState::Error | CallState::Canceled => {
                    return Err(NodeError::CallIncomplete(call.state()))
                }
                _ => tokio::time::sleep(Duration::from_millis(CALL_POLL_INTERVAL_MS)).await,
            }
        }
    }

    pub async fn find_node(&self, target: Id, option: LookupOption) -> Result<Vec<PeerInfo>, NodeError> {
        if option == LookupOption::Local {
            return self.get_peers(&target, 20).await;
        }
        let (peer_id, addr) = self.pick_peer(option).ok_or(NodeError::NoRoute(target))?;
        let params = FindNodeParams { target, limit: 20 };
        let body = bincode::serialize(&params).map_err(|e| NodeError::BosonError(e.to_string()))?;
        let message = Message::request(Method::FindNode, 0, body);
        let call = self.rpc.send_call(peer_id, addr, message, None).await?;
        let response_body = self.await_call(call).await?;
        let response: PeersResponse =
            bincode::deserialize(&response_body).map_err(|e| NodeError::BosonError(e.to_string()))?;
        Ok(response.peers)
    }

    pub async fn find_value(
        &self,
        id: Id,
        expected_sequence_number: Option<u64>,
        option: LookupOption,
    ) -> Result<Option<Value>, NodeError> {
        if option == LookupOption::Local {
            return self.get_value(&id).await;
        }
        let (peer_id, addr) = self.pick_peer(option).ok_or(NodeError::NoRoute(id))?;
        let params = FindValueParams {
            id,
            expected_sequence_number,
        };
        let body = bincode::serialize(&params).map_err(|e| NodeError::BosonError(e.to_string()))?;
        let message = Message::request(Method::FindValue, 0, body);
        let call = self.rpc.send_call(peer_id, addr, message, None).await?;
        let response_body = self.await_call(call).await?;
        let response: ValueResponse =
            bincode::deserialize(&response_body).map_err(|e| NodeError::BosonError(e.to_string()))?;
        Ok(response.value)
    }

    pub async fn store_value(
        &self,
        value: Value,
        expected_sequence_number: Option<u64>,
        persistent: bool,
    ) -> Result<(), NodeError> {
        let lifecycle = if persistent {
            Lifecycle::Persistent
        } else {
            Lifecycle::ExpiresAt(Utc::now() + self.config.value_expiration)
        };
        self.storage
            .put_value(value.clone(), expected_sequence_number, lifecycle)
            .await?;

        if let Some((peer_id, addr)) = self.directory.any_peer() {
            let params = StoreValueParams {
                value,
                expected_sequence_number,
                persistent,
            };
            if let Ok(body) = bincode::serialize(&params) {
                let message = Message::request(Method::StoreValue, 0, body);
                let _ = self.rpc.send_call(peer_id, addr, message, None).await;
            }
        }
        Ok(())
    }

    pub async fn find_peer(
        &self,
        id: Id,
        expected_sequence_number: Option<u64>,
        expected_count: usize,
        option: LookupOption,
    ) -> Result<Vec<PeerInfo>, NodeError> {
        let _ = expected_sequence_number;
        if option == LookupOption::Local {
            return self.get_peers(&id, expected_count).await;
        }
        let (peer_id, addr) = self.pick_peer(option).ok_or(NodeError::NoRoute(id))?;
        let params = FindPeerParams {
            id,
            expected_sequence_number,
            expected_count,
        };
        let body = bincode::serialize(&params).map_err(|e| NodeError::BosonError(e.to_string()))?;
        let message = Message::request(Method::FindPeer, 0, body);
        let call = self.rpc.send_call(peer_id, addr, message, None).await?;
        let response_body = self.await_call(call).await?;
        let response: PeersResponse =
            bincode::deserialize(&response_body).map_err(|e| NodeError::BosonError(e.to_string()))?;
        Ok(response.peers)
    }

    pub async fn announce_peer(
        &self,
        peer: PeerInfo,
        expected_sequence_number: Option<u64>,
        persistent: bool,
    ) -> Result<(), NodeError> {
        let lifecycle = if persistent {
            Lifecycle::Persistent
        } else {
            Lifecycle::ExpiresAt(Utc::now() + self.config.peer_expiration)
        };
        self.storage.put_peer(peer.clone(), lifecycle).await?;

        if let Some((peer_id, addr)) = self.directory.any_peer() {
            let params = AnnouncePeerParams {
                peer,
                expected_sequence_number,
                persistent,
            };
            if let Ok(body) = bincode::serialize(&params) {
                let message = Message::request(Method::AnnouncePeer, 0, body);
                let _ = self.rpc.send_call(peer_id, addr, message, None).await;
            }
        }
        Ok(())
    }

    // --- Local mirrors, bypassing the network entirely. ---

    pub async fn get_value(&self, id: &Id) -> Result<Option<Value>, NodeError> {
        Ok(self.storage.get_value(id).await?)
    }

    pub async fn remove_value(&self, id: &Id) -> Result<bool, NodeError> {
        Ok(self.storage.remove_value(id).await?)
    }

    pub async fn get_peer(&self, id: &Id, fingerprint: Fingerprint) -> Result<Option<PeerInfo>, NodeError> {
        Ok(self.storage.get_peer(id, fingerprint).await?)
    }

    pub async fn get_peers(&self, id: &Id, limit: usize) -> Result<Vec<PeerInfo>, NodeError> {
        Ok(self.storage.get_peers(id, limit).await?)
    }

    pub async fn remove_peer(&self, id: &Id, fingerprint: Fingerprint) -> Result<bool, NodeError> {
        Ok(self.storage.remove_peer(id, fingerprint).await?)
    }
}
