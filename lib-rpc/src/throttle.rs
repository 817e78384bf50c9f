//! Per-host token bucket throttle, applied independently to inbound and
//! outbound traffic. Grounded in the window-counter rate limiter the
//! teacher's DNS transport uses, generalized here to a true token bucket
//! so callers can ask "how long until the next token" rather than just
//! "are we over budget".

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// 32 operations/second sustained, bursts up to 128.
pub const THROTTLE_RATE_PER_SEC: f64 = 32.0;
pub const THROTTLE_BURST: f64 = 128.0;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new() -> Self {
        Bucket {
            tokens: THROTTLE_BURST,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * THROTTLE_RATE_PER_SEC).min(THROTTLE_BURST);
        self.last_refill = now;
    }
}

/// A per-host token bucket throttle. `Disabled` tracks nothing and always
/// allows immediately, matching developer mode and config opt-out.
pub enum Throttle {
    Enabled(Mutex<HashMap<IpAddr, Bucket>>),
    Disabled,
}

impl Throttle {
    pub fn enabled() -> Self {
        Throttle::Enabled(Mutex::new(HashMap::new()))
    }

    pub fn disabled() -> Self {
        Throttle::Disabled
    }

    /// Consumes one token for `host` and returns the delay, in
    /// milliseconds, until the next token will be available — `0` if the
    /// request is allowed immediately.
    pub fn increment_and_estimate_delay(&self, host: IpAddr) -> u64 {
        let buckets = match self {
            Throttle::Disabled => return 0,
            Throttle::Enabled(buckets) => buckets,
        };

        let now = Instant::now();
        let mut buckets = buckets.lock();
        let bucket = buckets.entry(host).or_insert_with(Bucket::new);
        bucket.refill(now);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return 0;
        }

        let deficit = 1.0 - bucket.tokens;
        let wait = Duration::from_secs_f64(deficit / THROTTLE_RATE_PER_SEC);
        wait.as_millis() as u64
    }

    /// Clears any accumulated state for `host`, used by the server after a
    /// successful outbound send to let the corresponding response back in
    /// without being throttled by the request's own inbound bucket.
    pub fn clear(&self, host: IpAddr) {
        if let Throttle::Enabled(buckets) = self {
            buckets.lock().remove(&host);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_throttle_never_delays() {
        let throttle = Throttle::disabled();
        let host: IpAddr = "10.0.0.1".parse().unwrap();
        for _ in 0..1000 {
            assert_eq!(throttle.increment_and_estimate_delay(host), 0);
        }
    }

    #[test]
    fn enabled_throttle_allows_burst_then_delays() {
        let throttle = Throttle::enabled();
        let host: IpAddr = "10.0.0.2".parse().unwrap();

        for _ in 0..THROTTLE_BURST as usize {
            assert_eq!(throttle.increment_and_estimate_delay(host), 0);
        }
        assert!(throttle.increment_and_estimate_delay(host) > 0);
    }

    #[test]
    fn buckets_are_independent_per_host() {
        let throttle = Throttle::enabled();
        let a: IpAddr = "10.0.0.3".parse().unwrap();
        let b: IpAddr = "10.0.0.4".parse().unwrap();

        for _ in 0..THROTTLE_BURST as usize {
            throttle.increment_and_estimate_delay(a);
        }
        assert!(throttle.increment_and_estimate_delay(a) > 0);
        assert_eq!(throttle.increment_and_estimate_delay(b), 0);
    }

    #[test]
    fn clear_resets_a_hosts_bucket() {
        let throttle = Throttle::enabled();
        let host: IpAddr = "10.0.0.5".parse().unwrap();
        for _ in 0..THROTTLE_BURST as usize {
            throttle.increment_and_estimate_delay(host);
        }
        throttle.clear(host);
        assert_eq!(throttle.increment_and_estimate_delay(host), 0);
    }
}
