//! The per-request state machine tracked while waiting on a response.

use std::net::SocketAddr;
use std::time::Instant;

use crate::message::Method;

/// Maximum wall time any single call is allowed to stay pending.
pub const RPC_CALL_TIMEOUT_MAX_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Unsent,
    Sent,
    Stalled,
    Timeout,
    Responded,
    Error,
    Canceled,
}

impl CallState {
    pub fn is_final(self) -> bool {
        matches!(
            self,
            CallState::Timeout | CallState::Responded | CallState::Error | CallState::Canceled
        )
    }
}

#[derive(Debug, Clone)]
pub enum CallFailureCause {
    ProtocolError,
    Timeout,
    Canceled,
    Other(String),
}

/// Observes state transitions of a single [`RpcCall`]. All methods are
/// optional; the server's internal bookkeeping always runs first so a
/// listener can rely on `pending_calls` already reflecting the new state.
pub trait CallListener: Send + Sync {
    fn on_state_change(&self, _prev: CallState, _new: CallState) {}
    fn on_response(&self, _body: &[u8]) {}
    fn on_stall(&self) {}
    fn on_timeout(&self) {}
}

/// A single outstanding request and everything needed to resolve it.
pub struct RpcCall {
    pub txid: u32,
    pub method: Method,
    pub destination: SocketAddr,
    pub state: CallState,
    pub expected_rtt_ms: Option<u64>,
    pub sent_time: Option<Instant>,
    pub response_time: Option<Instant>,
    pub cause: Option<CallFailureCause>,
    pub response_body: Option<Vec<u8>>,
    listener: Option<Box<dyn CallListener>>,
}

impl RpcCall {
    pub fn new(txid: u32, method: Method, destination: SocketAddr) -> Self {
        RpcCall {
            txid,
            method,
            destination,
            state: CallState::Unsent,
            expected_rtt_ms: None,
            sent_time: None,
            response_time: None,
            cause: None,
            response_body: None,
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: Box<dyn CallListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    fn transition(&mut self, new: CallState) {
        let prev = self.state;
        self.state = new;
        if let Some(listener) = &self.listener {
            listener.on_state_change(prev, new);
        }
    }

    /// Records transmission and establishes the expected RTT if the
    /// sampler hadn't already supplied one.
    pub fn sent(&mut self, expected_rtt_ms: u64) {
        if self.expected_rtt_ms.is_none() {
            self.expected_rtt_ms = Some(expected_rtt_ms);
        }
        self.sent_time = Some(Instant::now());
        self.transition(CallState::Sent);
    }

    /// A timer fired before `RPC_CALL_TIMEOUT_MAX_MS` elapsed since send.
    /// Moves `Sent -> Stalled`; a no-op from any other state.
    pub fn stall(&mut self) {
        if self.state != CallState::Sent {
            return;
        }
        self.transition(CallState::Stalled);
        if let Some(listener) = &self.listener {
            listener.on_stall();
        }
    }

    /// A timer fired at or after `RPC_CALL_TIMEOUT_MAX_MS`. Final.
    pub fn timeout(&mut self) {
        if self.state.is_final() {
            return;
        }
        self.cause = Some(CallFailureCause::Timeout);
        self.transition(CallState::Timeout);
        if let Some(listener) = &self.listener {
            listener.on_timeout();
        }
    }

    /// A valid response body arrived for this call. Final.
    pub fn respond(&mut self, body: Vec<u8>) {
        if self.state.is_final() {
            return;
        }
        self.response_time = Some(Instant::now());
        if let Some(listener) = &self.listener {
            listener.on_response(&body);
        }
        self.response_body = Some(body);
        self.transition(CallState::Responded);
    }

    /// The destination returned an ERROR body. Final.
    pub fn fail(&mut self, cause: CallFailureCause) {
        if self.state.is_final() {
            return;
        }
        self.cause = Some(cause);
        self.transition(CallState::Error);
    }

    /// The response arrived from a method other than the one sent.
    /// Treated as a protocol error, not attributed to the remote address
    /// mismatch path.
    pub fn method_mismatch(&mut self) {
        self.fail(CallFailureCause::ProtocolError);
    }

    /// The response txid matched but the source address didn't. No
    /// penalty: the call simply returns to `Stalled` and keeps waiting,
    /// while the caller should flag the observed source as suspicious.
    pub fn source_mismatch(&mut self) {
        if self.state.is_final() {
            return;
        }
        self.transition(CallState::Stalled);
    }

    /// Caller-initiated cancellation. Final, no-op if already final.
    pub fn cancel(&mut self) {
        if self.state.is_final() {
            return;
        }
        self.cause = Some(CallFailureCause::Canceled);
        self.transition(CallState::Canceled);
    }
}
