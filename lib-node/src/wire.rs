//! Request/response payloads carried in an [`lib_rpc::Message`] body,
//! discriminated by the message's own [`lib_rpc::Method`].

use lib_identity::{Id, PeerInfo, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindNodeParams {
    pub target: Id,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindValueParams {
    pub id: Id,
    pub expected_sequence_number: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreValueParams {
    pub value: Value,
    pub expected_sequence_number: Option<u64>,
    pub persistent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindPeerParams {
    pub id: Id,
    pub expected_sequence_number: Option<u64>,
    pub expected_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnouncePeerParams {
    pub peer: PeerInfo,
    pub expected_sequence_number: Option<u64>,
    pub persistent: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeersResponse {
    pub peers: Vec<PeerInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValueResponse {
    pub value: Option<Value>,
}
