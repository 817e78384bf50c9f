//! Boson DHT RPC transport.
//!
//! Wraps a UDP socket with the per-peer encrypted session, call state
//! machine, throttling, and suspicious-node tracking a Kademlia-style
//! node needs, independent of the lookup/storage logic riding on top.

pub mod call;
pub mod detector;
pub mod error;
pub mod message;
pub mod metrics;
pub mod server;
pub mod throttle;
pub mod timeout_sampler;

pub use call::{CallFailureCause, CallListener, CallState, RpcCall, RPC_CALL_TIMEOUT_MAX_MS};
pub use detector::{Blacklist, SuspiciousNodeDetector, Violation};
pub use error::RpcError;
pub use message::{Message, MessageKind, Method, MIN_FRAME_LEN};
pub use metrics::{MetricsSnapshot, ReputationTracker, RpcMetrics};
pub use server::{MessageHandler, PeerKeyResolver, PendingCall, RpcServer, MAX_PENDING_CALLS};
pub use throttle::Throttle;
pub use timeout_sampler::TimeoutSampler;
