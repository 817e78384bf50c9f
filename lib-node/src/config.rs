//! Node configuration. A plain, serde-deserializable struct — no bespoke
//! parser; callers load it from whatever format they like (TOML, JSON,
//! environment) and hand it to [`crate::Node::start`].

use std::net::Ipv6Addr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration consumed by the node core. Expirations default to two
/// hours and live only here — there is no separate `MAX_VALUE_AGE`
/// constant duplicating this value elsewhere in the crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub host4: std::net::Ipv4Addr,
    pub host6: Option<Ipv6Addr>,
    pub port: u16,
    /// Raw Ed25519 secret key bytes (seed or full keypair encoding,
    /// per [`lib_identity::NodeIdentity::from_secret_bytes`]).
    pub private_key: Vec<u8>,
    pub data_dir: PathBuf,
    /// `sqlite://...` or `postgres://...`; `None` selects the in-memory
    /// backend.
    pub storage_uri: Option<String>,
    pub bootstraps: Vec<BootstrapNode>,
    pub enable_spam_throttling: bool,
    pub enable_suspicious_node_detector: bool,
    pub enable_developer_mode: bool,
    pub enable_metrics: bool,
    #[serde(with = "humantime_secs")]
    pub value_expiration: Duration,
    #[serde(with = "humantime_secs")]
    pub peer_expiration: Duration,
}

/// A bootstrap peer's identity and last-known address, exactly what's
/// needed to seed the RPC key resolver and send the first request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapNode {
    pub id: lib_identity::Id,
    pub public_key: [u8; 32],
    pub addr: std::net::SocketAddr,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            host4: std::net::Ipv4Addr::new(0, 0, 0, 0),
            host6: None,
            port: 39001,
            private_key: Vec::new(),
            data_dir: PathBuf::from("./boson-data"),
            storage_uri: None,
            bootstraps: Vec::new(),
            enable_spam_throttling: true,
            enable_suspicious_node_detector: true,
            enable_developer_mode: false,
            enable_metrics: false,
            value_expiration: Duration::from_secs(2 * 3600),
            peer_expiration: Duration::from_secs(2 * 3600),
        }
    }
}

mod humantime_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_expirations_are_two_hours() {
        let config = NodeConfig::default();
        assert_eq!(config.value_expiration, Duration::from_secs(2 * 3600));
        assert_eq!(config.peer_expiration, Duration::from_secs(2 * 3600));
    }

    #[test]
    fn roundtrips_through_json() {
        let config = NodeConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: NodeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.port, config.port);
    }
}
