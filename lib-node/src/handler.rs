//! Routes inbound `REQUEST`s to the local storage backend. This is the
//! upstream handler the RPC transport calls into; it has no knowledge of
//! call state, throttling, or sessions — that all lives in `lib-rpc`.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use lib_identity::Id;
use lib_rpc::{Message, MessageHandler, Method};
use lib_storage::{DataStorage, Lifecycle};

use crate::config::NodeConfig;
use crate::wire::{
    AnnouncePeerParams, FindNodeParams, FindPeerParams, FindValueParams, PeersResponse,
    StoreValueParams, ValueResponse,
};

pub struct NodeRequestHandler<S: DataStorage> {
    storage: Arc<S>,
    config: NodeConfig,
}

impl<S: DataStorage> NodeRequestHandler<S> {
    pub fn new(storage: Arc<S>, config: NodeConfig) -> Self {
        NodeRequestHandler { storage, config }
    }

    fn lifecycle(&self, persistent: bool) -> Lifecycle {
        if persistent {
            Lifecycle::Persistent
        } else {
            Lifecycle::ExpiresAt(Utc::now() + self.config.value_expiration)
        }
    }
}

#[async_trait]
impl<S: DataStorage + 'static> MessageHandler for NodeRequestHandler<S> {
    async fn handle_request(&self, sender: Id, _from: SocketAddr, message: Message) -> Message {
        let method = message.method;
        let txid = message.txid;

        let result = self.dispatch(sender, method, &message.body).await;
        match result {
            Ok(body) => Message::response(method, txid, body),
            Err(err) => Message::error(method, txid, err.to_string()),
        }
    }
}

impl<S: DataStorage> NodeRequestHandler<S> {
    async fn dispatch(&self, sender: Id, method: Method, body: &[u8]) -> Result<Vec<u8>, anyhow::Error> {
        match method {
            Method::Ping => Ok(Vec::new()),
            Method::FindNode => {
                let params: FindNodeParams = bincode::deserialize(body)?;
                let peers = self.storage.get_peers(&params.target, params.limit).await?;
                Ok(bincode::serialize(&PeersResponse { peers })?)
            }
            Method::FindValue => {
                let params: FindValueParams = bincode::deserialize(body)?;
                let value = self.storage.get_value(&params.id).await?;
                Ok(bincode::serialize(&ValueResponse { value })?)
            }
            Method::StoreValue => {
                let params: StoreValueParams = bincode::deserialize(body)?;
                let lifecycle = self.lifecycle(params.persistent);
                self.storage
                    .put_value(params.value, params.expected_sequence_number, lifecycle)
                    .await?;
                Ok(Vec::new())
            }
            Method::FindPeer => {
                let params: FindPeerParams = bincode::deserialize(body)?;
                let peers = self
                    .storage
                    .get_peers(&params.id, params.expected_count)
                    .await?;
                Ok(bincode::serialize(&PeersResponse { peers })?)
            }
            Method::AnnouncePeer => {
                let params: AnnouncePeerParams = bincode::deserialize(body)?;
                let _ = sender;
                let lifecycle = self.lifecycle(params.persistent);
                self.storage.put_peer(params.peer, lifecycle).await?;
                Ok(Vec::new())
            }
        }
    }
}
