//! Boson DHT node façade.
//!
//! Wires [`lib_identity`]'s keys, [`lib_storage`]'s backends, and
//! [`lib_rpc`]'s transport behind a single [`Node`] handle: `start`/
//! `stop`, `bootstrap`, the five DHT operations, and local mirrors that
//! bypass the network entirely.

pub mod config;
pub mod directory;
pub mod error;
pub mod handler;
pub mod node;
pub mod wire;

pub use config::{BootstrapNode, NodeConfig};
pub use directory::PeerDirectory;
pub use error::NodeError;
pub use handler::NodeRequestHandler;
pub use node::{LookupOption, Node};
