//! Wire shape: `sender_id (32) ∥ nonce (24) ∥ crypto_box_easy(plaintext)`.
//! `plaintext` is the bincode encoding of a [`Message`].

use lib_identity::ID_LEN;
use serde::{Deserialize, Serialize};

use crate::error::RpcError;

/// Method codes the node façade's operations are framed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    Ping,
    FindNode,
    FindValue,
    StoreValue,
    FindPeer,
    AnnouncePeer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MessageKind {
    Request,
    Response,
    Error,
}

/// A single RPC message, framed for transport but opaque to it: the body
/// is whatever the method's request/response payload serializes to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageKind,
    pub method: Method,
    /// Monotonically increasing per sender, scoped to that sender's id.
    pub txid: u32,
    pub body: Vec<u8>,
}

impl Message {
    /// Smallest plausible bincode encoding of a `Message` with an empty
    /// body: kind discriminant + method discriminant + txid + empty-vec
    /// length prefix. Used as a lower bound when rejecting malformed
    /// frames before attempting to deserialize them.
    pub const MIN_BYTES: usize = 1 + 1 + 4 + 8;

    pub fn request(method: Method, txid: u32, body: Vec<u8>) -> Self {
        Message {
            kind: MessageKind::Request,
            method,
            txid,
            body,
        }
    }

    pub fn response(method: Method, txid: u32, body: Vec<u8>) -> Self {
        Message {
            kind: MessageKind::Response,
            method,
            txid,
            body,
        }
    }

    pub fn error(method: Method, txid: u32, cause: String) -> Self {
        Message {
            kind: MessageKind::Error,
            method,
            txid,
            body: cause.into_bytes(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, RpcError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RpcError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Minimum length of a raw UDP datagram: sender id, nonce, MAC, and the
/// smallest possible encoded [`Message`].
pub const MIN_FRAME_LEN: usize = ID_LEN + lib_crypto::NONCE_LEN + lib_crypto::MAC_LEN + Message::MIN_BYTES;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_roundtrips_through_bincode() {
        let msg = Message::request(Method::Ping, 7, vec![1, 2, 3]);
        let encoded = msg.encode().unwrap();
        let decoded = Message::decode(&encoded).unwrap();
        assert_eq!(decoded.txid, 7);
        assert!(matches!(decoded.method, Method::Ping));
        assert_eq!(decoded.body, vec![1, 2, 3]);
    }

    #[test]
    fn min_frame_len_accounts_for_id_nonce_mac_and_message() {
        assert_eq!(MIN_FRAME_LEN, 32 + 24 + 16 + Message::MIN_BYTES);
    }
}
