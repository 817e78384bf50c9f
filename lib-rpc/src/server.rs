//! The UDP transport: one socket, a pending-calls table, and the inbound
//! dispatch pipeline described in the RPC component design (throttle,
//! blacklist/suspicious-node checks, decrypt, parse, route).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lib_identity::{CryptoContext, Id, Identity, NodeIdentity, ID_LEN};
use parking_lot::Mutex as SyncMutex;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::Mutex as AsyncMutex;

use crate::call::{CallFailureCause, CallListener, CallState, RpcCall, RPC_CALL_TIMEOUT_MAX_MS};
use crate::detector::{Blacklist, SuspiciousNodeDetector, Violation};
use crate::error::RpcError;
use crate::message::{Message, MessageKind, MIN_FRAME_LEN};
use crate::metrics::{MetricsSnapshot, ReputationTracker, RpcMetrics};
use crate::throttle::Throttle;
use crate::timeout_sampler::TimeoutSampler;

/// Maximum number of RPC calls this server will track concurrently.
pub const MAX_PENDING_CALLS: usize = 1024;
const REACHABILITY_CHECK_INTERVAL: Duration = Duration::from_secs(5);
const UNREACHABLE_AFTER: Duration = Duration::from_secs(60);
const SOCKET_BUFFER_BYTES: usize = 1024 * 1024;
const TIMER_STEP_MS: u64 = 1000;

/// Resolves the raw Ed25519 public key behind an [`Id`] so the server can
/// establish (or re-establish) an encrypted session with a peer it has
/// only just heard from.
pub trait PeerKeyResolver: Send + Sync {
    fn public_key_for(&self, id: &Id) -> Option<[u8; 32]>;
}

/// Upstream handler for inbound `REQUEST`s, implemented by the node
/// façade that owns the actual lookup/storage logic.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle_request(&self, sender: Id, from: SocketAddr, message: Message) -> Message;
}

/// A handle to an in-flight request. Holds the state machine and enough
/// context (destination id) to feed RTT samples back to the right
/// [`TimeoutSampler`] once it resolves.
pub struct PendingCall {
    call: SyncMutex<RpcCall>,
    destination_id: Id,
}

impl PendingCall {
    pub fn state(&self) -> crate::call::CallState {
        self.call.lock().state
    }

    pub fn cancel(&self) {
        self.call.lock().cancel();
    }

    pub fn response_body(&self) -> Option<Vec<u8>> {
        self.call.lock().response_body.clone()
    }
}

/// Owns one UDP socket and the bookkeeping needed to correlate requests
/// with responses, throttle abusive peers, and track reachability.
pub struct RpcServer {
    socket: Arc<UdpSocket>,
    identity: Arc<NodeIdentity>,
    key_resolver: Arc<dyn PeerKeyResolver>,
    handler: Arc<dyn MessageHandler>,

    sessions: AsyncMutex<HashMap<Id, CryptoContext>>,
    pending_calls: SyncMutex<HashMap<u32, Arc<PendingCall>>>,
    samplers: SyncMutex<HashMap<Id, Arc<TimeoutSampler>>>,
    next_txid: AtomicU32,

    throttle_in: Throttle,
    throttle_out: Throttle,
    blacklist: Arc<Blacklist>,
    detector: Arc<SuspiciousNodeDetector>,

    received_packets: AtomicU32,
    last_progress_count: AtomicU32,
    last_progress_at: SyncMutex<Instant>,
    reachable: AtomicBool,

    metrics: RpcMetrics,
    reputation: ReputationTracker,
}

impl RpcServer {
    pub async fn bind(
        addr: SocketAddr,
        identity: Arc<NodeIdentity>,
        key_resolver: Arc<dyn PeerKeyResolver>,
        handler: Arc<dyn MessageHandler>,
        developer_mode: bool,
    ) -> Result<Arc<Self>, RpcError> {
        let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let raw_socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        raw_socket.set_nonblocking(true)?;
        raw_socket.set_recv_buffer_size(SOCKET_BUFFER_BYTES)?;
        raw_socket.set_send_buffer_size(SOCKET_BUFFER_BYTES)?;
        raw_socket.bind(&addr.into())?;
        #[cfg(target_os = "linux")]
        {
            let _ = raw_socket.set_tos(0x10); // IPTOS_THROUGHPUT
        }
        let std_socket: std::net::UdpSocket = raw_socket.into();
        let socket = Arc::new(UdpSocket::from_std(std_socket)?);

        let (throttle_in, throttle_out) = if developer_mode {
            (Throttle::disabled(), Throttle::disabled())
        } else {
            (Throttle::enabled(), Throttle::enabled())
        };

        let server = Arc::new(RpcServer {
            socket,
            identity,
            key_resolver,
            handler,
            sessions: AsyncMutex::new(HashMap::new()),
            pending_calls: SyncMutex::new(HashMap::new()),
            samplers: SyncMutex::new(HashMap::new()),
            next_txid: AtomicU32::new(1),
            throttle_in,
            throttle_out,
            blacklist: Arc::new(Blacklist::new()),
            detector: Arc::new(SuspiciousNodeDetector::new()),
            received_packets: AtomicU32::new(0),
            last_progress_count: AtomicU32::new(0),
            last_progress_at: SyncMutex::new(Instant::now()),
            reachable: AtomicBool::new(true),
            metrics: RpcMetrics::new(),
            reputation: ReputationTracker::new(),
        });

        let recv_server = Arc::clone(&server);
        tokio::spawn(async move { recv_server.recv_loop().await });

        let reachability_server = Arc::clone(&server);
        tokio::spawn(async move { reachability_server.reachability_loop().await });

        Ok(server)
    }

    pub fn blacklist(&self) -> &Arc<Blacklist> {
        &self.blacklist
    }

    pub fn detector(&self) -> &Arc<SuspiciousNodeDetector> {
        &self.detector
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Relaxed)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn reputation(&self, id: &Id) -> i64 {
        self.reputation.get(id)
    }

    fn sampler_for(&self, id: Id) -> Arc<TimeoutSampler> {
        Arc::clone(
            self.samplers
                .lock()
                .entry(id)
                .or_insert_with(|| Arc::new(TimeoutSampler::new())),
        )
    }

    async fn session_for(&self, id: Id) -> Result<(), RpcError> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&id) {
            return Ok(());
        }
        let public_key = self
            .key_resolver
            .public_key_for(&id)
            .ok_or_else(|| RpcError::ProtocolError(format!("no known public key for {id}")))?;
        let sealed = self.identity.create_crypto_context(&public_key)?;
        sessions.insert(id, CryptoContext::new(sealed));
        Ok(())
    }

    /// Registers a peer's session eagerly, e.g. after a storage lookup
    /// resolves a bootstrap node's public key.
    pub async fn ensure_session(&self, id: Id, public_key: &[u8; 32]) -> Result<(), RpcError> {
        let mut sessions = self.sessions.lock().await;
        if !sessions.contains_key(&id) {
            let sealed = self.identity.create_crypto_context(public_key)?;
            sessions.insert(id, CryptoContext::new(sealed));
        }
        Ok(())
    }

    fn next_txid(&self) -> u32 {
        self.next_txid.fetch_add(1, Ordering::Relaxed)
    }

    /// Sends a request, installing it into `pending_calls` for response
    /// matching. Rejected once 1024 calls are already outstanding.
    pub async fn send_call(
        self: &Arc<Self>,
        destination_id: Id,
        destination_addr: SocketAddr,
        mut message: Message,
        listener: Option<Box<dyn CallListener>>,
    ) -> Result<Arc<PendingCall>, RpcError> {
        {
            let pending = self.pending_calls.lock();
            if pending.len() >= MAX_PENDING_CALLS {
                return Err(RpcError::TooManyPendingCalls(pending.len()));
            }
        }

        let host = destination_addr.ip();
        let delay_ms = self.throttle_out.increment_and_estimate_delay(host);
        if delay_ms > 0 {
            self.metrics.record_throttled();
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        let txid = self.next_txid();
        message.txid = txid;
        let method = message.method;
        let expected_rtt = self.sampler_for(destination_id).stall_timeout();

        let mut call = RpcCall::new(txid, method, destination_addr);
        if let Some(listener) = listener {
            call = call.with_listener(listener);
        }
        let pending_call = Arc::new(PendingCall {
            call: SyncMutex::new(call),
            destination_id,
        });

        self.session_for(destination_id).await?;
        let encoded = message.encode()?;
        let frame = {
            let mut sessions = self.sessions.lock().await;
            let ctx = sessions.get_mut(&destination_id).expect("session just ensured");
            ctx.encrypt(&encoded)?
        };

        let mut datagram = Vec::with_capacity(ID_LEN + frame.len());
        datagram.extend_from_slice(self.identity.id().as_bytes());
        datagram.extend_from_slice(&frame);

        match self.socket.send_to(&datagram, destination_addr).await {
            Ok(_) => {
                pending_call.call.lock().sent(expected_rtt);
                self.throttle_in.clear(host);
                self.metrics.record_sent();
                self.pending_calls.lock().insert(txid, Arc::clone(&pending_call));
                self.schedule_timeout(txid, Arc::clone(&pending_call));
                Ok(pending_call)
            }
            Err(err) => {
                pending_call
                    .call
                    .lock()
                    .fail(CallFailureCause::Other(err.to_string()));
                Err(RpcError::Io(err))
            }
        }
    }

    /// Drives a call's timer: a tick before `RPC_CALL_TIMEOUT_MAX_MS` has
    /// elapsed moves it to `Stalled` and reschedules for the remainder; a
    /// tick at or past the max moves it to `Timeout`. Also the only place
    /// that reclaims a `pending_calls` slot once a call goes final by any
    /// route other than a matched response (timeout, or an external
    /// `cancel()`/`fail()`), since the timer is the one thing guaranteed
    /// to keep polling a call no one has replied to.
    fn schedule_timeout(self: &Arc<Self>, txid: u32, pending: Arc<PendingCall>) {
        let server = Arc::clone(self);
        tokio::spawn(async move {
            let mut remaining = RPC_CALL_TIMEOUT_MAX_MS;
            loop {
                let step = remaining.min(TIMER_STEP_MS);
                tokio::time::sleep(Duration::from_millis(step)).await;
                remaining = remaining.saturating_sub(step);

                let mut call = pending.call.lock();
                if call.state.is_final() {
                    drop(call);
                    server.pending_calls.lock().remove(&txid);
                    return;
                }
                if remaining == 0 {
                    call.timeout();
                    drop(call);
                    server.metrics.record_timeout();
                    server.reputation.record_failure(pending.destination_id);
                    server.pending_calls.lock().remove(&txid);
                    return;
                }
                call.stall();
            }
        });
    }

    async fn recv_loop(self: Arc<Self>) {
        let mut buf = vec![0u8; 65_535];
        loop {
            let (len, from) = match self.socket.recv_from(&mut buf).await {
                Ok(v) => v,
                Err(err) => {
                    tracing::warn!(error = %err, "udp recv error");
                    continue;
                }
            };
            self.received_packets.fetch_add(1, Ordering::Relaxed);
            self.reachable.store(true, Ordering::Relaxed);
            self.metrics.record_received();

            let frame = buf[..len].to_vec();
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                server.handle_datagram(frame, from).await;
            });
        }
    }

    async fn handle_datagram(&self, frame: Vec<u8>, from: SocketAddr) {
        let host = from.ip();

        if self.throttle_in.increment_and_estimate_delay(host) > 0 {
            self.metrics.record_throttled();
            return;
        }

        if frame.len() < MIN_FRAME_LEN {
            self.detector.record(host, Violation::MalformedFrame);
            return;
        }

        let sender_id = match Id::try_from_slice(&frame[..ID_LEN]) {
            Ok(id) => id,
            Err(_) => {
                self.detector.record(host, Violation::MalformedFrame);
                return;
            }
        };

        if self.blacklist.is_banned(host, Some(sender_id)) || self.detector.is_banned(host) {
            self.metrics.record_banned();
            return;
        }

        if self.session_for(sender_id).await.is_err() {
            self.detector.record(host, Violation::MalformedFrame);
            return;
        }

        let plaintext = {
            let mut sessions = self.sessions.lock().await;
            let ctx = sessions.get_mut(&sender_id).expect("session just ensured");
            match ctx.decrypt(&frame[ID_LEN..]) {
                Ok(plaintext) => plaintext,
                Err(_) => {
                    self.detector.record(host, Violation::MalformedFrame);
                    return;
                }
            }
        };

        let message = match Message::decode(&plaintext) {
            Ok(message) => message,
            Err(_) => {
                self.detector.record(host, Violation::MalformedFrame);
                return;
            }
        };

        match message.kind {
            MessageKind::Request => {
                let response = self.handler.handle_request(sender_id, from, message).await;
                if let Ok(encoded) = response.encode() {
                    let _ = self.send_encrypted(sender_id, from, encoded).await;
                }
            }
            MessageKind::Response | MessageKind::Error => {
                self.handle_call_reply(sender_id, from, message).await;
            }
        }
    }

    async fn handle_call_reply(&self, sender_id: Id, from: SocketAddr, message: Message) {
        let pending = {
            let calls = self.pending_calls.lock();
            calls.get(&message.txid).cloned()
        };
        let pending = match pending {
            Some(pending) => pending,
            None => return,
        };

        let (method_matches, addr_matches) = {
            let call = pending.call.lock();
            (call.method == message.method, call.destination == from)
        };

        if !method_matches {
            pending.call.lock().method_mismatch();
            self.pending_calls.lock().remove(&message.txid);
            return;
        }

        if !addr_matches {
            pending.call.lock().source_mismatch();
            self.detector.record(from.ip(), Violation::SourceInconsistentResponse);
            return;
        }

        self.pending_calls.lock().remove(&message.txid);
        let is_first_contact =
            pending.destination_id == sender_id && !self.samplers.lock().contains_key(&sender_id);

        match message.kind {
            MessageKind::Response => {
                let sent_time = pending.call.lock().sent_time;
                pending.call.lock().respond(message.body);
                self.reputation.record_success(pending.destination_id);
                if is_first_contact {
                    if let Some(sent_time) = sent_time {
                        let rtt_ms = Instant::now().saturating_duration_since(sent_time).as_millis() as u64;
                        self.sampler_for(sender_id).update_and_recalc(rtt_ms);
                    }
                }
            }
            MessageKind::Error => {
                let cause = String::from_utf8_lossy(&message.body).to_string();
                pending.call.lock().fail(CallFailureCause::Other(cause));
                self.reputation.record_failure(pending.destination_id);
            }
            MessageKind::Request => unreachable!("requests are routed before reaching this branch"),
        }
    }

    async fn send_encrypted(&self, to_id: Id, to_addr: SocketAddr, plaintext: Vec<u8>) -> Result<(), RpcError> {
        self.session_for(to_id).await?;
        let frame = {
            let mut sessions = self.sessions.lock().await;
            let ctx = sessions.get_mut(&to_id).expect("session just ensured");
            ctx.encrypt(&plaintext)?
        };
        let mut datagram = Vec::with_capacity(ID_LEN + frame.len());
        datagram.extend_from_slice(self.identity.id().as_bytes());
        datagram.extend_from_slice(&frame);
        self.socket.send_to(&datagram, to_addr).await?;
        Ok(())
    }

    /// Every 5s, checks whether any packets arrived since the last tick;
    /// after 60s with none, marks the node unreachable and resets every
    /// per-peer timeout sampler so stale RTT history doesn't linger.
    async fn reachability_loop(self: Arc<Self>) {
        loop {
            tokio::time::sleep(REACHABILITY_CHECK_INTERVAL).await;

            let current = self.received_packets.load(Ordering::Relaxed);
            let previous = self.last_progress_count.swap(current, Ordering::Relaxed);

            if current != previous {
                *self.last_progress_at.lock() = Instant::now();
                continue;
            }

            let idle_for = self.last_progress_at.lock().elapsed();
            if idle_for >= UNREACHABLE_AFTER && self.reachable.swap(false, Ordering::Relaxed) {
                for sampler in self.samplers.lock().values() {
                    sampler.reset();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;

    use lib_identity::NodeIdentity;

    use crate::message::Method;

    struct StaticKeyResolver {
        keys: SyncMutex<StdHashMap<Id, [u8; 32]>>,
    }

    impl StaticKeyResolver {
        fn new() -> Self {
            StaticKeyResolver {
                keys: SyncMutex::new(StdHashMap::new()),
            }
        }

        fn insert(&self, id: Id, key: [u8; 32]) {
            self.keys.lock().insert(id, key);
        }
    }

    impl PeerKeyResolver for StaticKeyResolver {
        fn public_key_for(&self, id: &Id) -> Option<[u8; 32]> {
            self.keys.lock().get(id).copied()
        }
    }

    struct EchoHandler;

    #[async_trait]
    impl MessageHandler for EchoHandler {
        async fn handle_request(&self, _sender: Id, _from: SocketAddr, message: Message) -> Message {
            Message::response(message.method, message.txid, b"pong".to_vec())
        }
    }

    #[tokio::test]
    async fn ping_round_trips_between_two_servers() {
        let alice_identity = Arc::new(NodeIdentity::generate());
        let bob_identity = Arc::new(NodeIdentity::generate());

        let alice_resolver = Arc::new(StaticKeyResolver::new());
        let bob_resolver = Arc::new(StaticKeyResolver::new());
        alice_resolver.insert(bob_identity.id(), bob_identity.public_key());
        bob_resolver.insert(alice_identity.id(), alice_identity.public_key());

        let alice = RpcServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            Arc::clone(&alice_identity),
            alice_resolver,
            Arc::new(EchoHandler),
            true,
        )
        .await
        .unwrap();

        let bob = RpcServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            Arc::clone(&bob_identity),
            bob_resolver,
            Arc::new(EchoHandler),
            true,
        )
        .await
        .unwrap();

        let bob_addr = bob.socket.local_addr().unwrap();
        let request = Message::request(Method::Ping, 0, b"ping".to_vec());

        let call = alice
            .send_call(bob_identity.id(), bob_addr, request, None)
            .await
            .unwrap();

        for _ in 0..50 {
            if call.state() == CallState::Responded {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(call.state(), CallState::Responded);
        assert_eq!(call.response_body(), Some(b"pong".to_vec()));
    }

    #[tokio::test]
    async fn send_call_rejects_beyond_max_pending() {
        let identity = Arc::new(NodeIdentity::generate());
        let resolver = Arc::new(StaticKeyResolver::new());
        let server = RpcServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            identity,
            resolver,
            Arc::new(EchoHandler),
            true,
        )
        .await
        .unwrap();

        for _ in 0..MAX_PENDING_CALLS {
            server.pending_calls.lock().insert(
                rand::random::<u32>(),
                Arc::new(PendingCall {
                    call: SyncMutex::new(RpcCall::new(0, Method::Ping, "127.0.0.1:1".parse().unwrap())),
                    destination_id: Id::random(),
                }),
            );
        }

        let unknown_id = Id::random();
        let request = Message::request(Method::Ping, 0, vec![]);
        let err = server
            .send_call(unknown_id, "127.0.0.1:2".parse().unwrap(), request, None)
            .await;
        assert!(matches!(err, Err(RpcError::TooManyPendingCalls(_))));
    }

    #[tokio::test]
    async fn successful_round_trip_raises_reputation_and_counters() {
        let alice_identity = Arc::new(NodeIdentity::generate());
        let bob_identity = Arc::new(NodeIdentity::generate());

        let alice_resolver = Arc::new(StaticKeyResolver::new());
        let bob_resolver = Arc::new(StaticKeyResolver::new());
        alice_resolver.insert(bob_identity.id(), bob_identity.public_key());
        bob_resolver.insert(alice_identity.id(), alice_identity.public_key());

        let alice = RpcServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            Arc::clone(&alice_identity),
            alice_resolver,
            Arc::new(EchoHandler),
            true,
        )
        .await
        .unwrap();

        let bob = RpcServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            Arc::clone(&bob_identity),
            bob_resolver,
            Arc::new(EchoHandler),
            true,
        )
        .await
        .unwrap();

        let bob_addr = bob.socket.local_addr().unwrap();
        let request = Message::request(Method::Ping, 0, b"ping".to_vec());
        let call = alice
            .send_call(bob_identity.id(), bob_addr, request, None)
            .await
            .unwrap();

        for _ in 0..50 {
            if call.state() == CallState::Responded {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(call.state(), CallState::Responded);
        assert_eq!(alice.metrics().messages_sent, 1);
        assert_eq!(alice.reputation(&bob_identity.id()), 1);
    }
}
