//! Adaptive per-peer stall timeout, derived from a running histogram of
//! observed round-trip times rather than a fixed constant.

use parking_lot::Mutex;

const BUCKET_MS: u64 = 50;
const MAX_RTT_MS: u64 = 10_000;
const BUCKET_COUNT: usize = (MAX_RTT_MS / BUCKET_MS) as usize;
const PERCENTILE: f64 = 0.90;

pub const MIN_STALL_TIMEOUT_MS: u64 = 100;
pub const MAX_STALL_TIMEOUT_MS: u64 = 10_000;

struct Histogram {
    buckets: [u32; BUCKET_COUNT],
    total: u32,
    current_estimate_ms: u64,
}

impl Histogram {
    fn new() -> Self {
        Histogram {
            buckets: [0; BUCKET_COUNT],
            total: 0,
            current_estimate_ms: MAX_STALL_TIMEOUT_MS,
        }
    }
}

/// Bins observed RTTs into 50 ms buckets and exposes a percentile-based
/// stall timeout, clamped to `[100ms, 10_000ms]`. Reset whenever the
/// owning connection loses reachability, since stale RTTs no longer
/// reflect current network conditions.
pub struct TimeoutSampler {
    histogram: Mutex<Histogram>,
}

impl Default for TimeoutSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeoutSampler {
    pub fn new() -> Self {
        TimeoutSampler {
            histogram: Mutex::new(Histogram::new()),
        }
    }

    /// Records an observed RTT and recomputes the percentile estimate.
    pub fn update_and_recalc(&self, rtt_ms: u64) {
        let mut h = self.histogram.lock();
        let clamped = rtt_ms.min(MAX_RTT_MS - 1);
        let bucket = (clamped / BUCKET_MS) as usize;
        h.buckets[bucket] += 1;
        h.total += 1;

        let target = (h.total as f64 * PERCENTILE).ceil() as u32;
        let mut cumulative = 0u32;
        for (i, &count) in h.buckets.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                h.current_estimate_ms = ((i as u64) + 1) * BUCKET_MS;
                break;
            }
        }
    }

    /// Current stall timeout estimate, clamped to the valid range.
    pub fn stall_timeout(&self) -> u64 {
        self.histogram
            .lock()
            .current_estimate_ms
            .clamp(MIN_STALL_TIMEOUT_MS, MAX_STALL_TIMEOUT_MS)
    }

    /// Clears all observations, reverting to the conservative maximum
    /// until fresh samples arrive.
    pub fn reset(&self) {
        *self.histogram.lock() = Histogram::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stall_timeout_starts_at_maximum() {
        let sampler = TimeoutSampler::new();
        assert_eq!(sampler.stall_timeout(), MAX_STALL_TIMEOUT_MS);
    }

    #[test]
    fn stall_timeout_tracks_observed_rtts() {
        let sampler = TimeoutSampler::new();
        for _ in 0..100 {
            sampler.update_and_recalc(200);
        }
        let timeout = sampler.stall_timeout();
        assert!(timeout >= 200 && timeout <= 300);
    }

    #[test]
    fn stall_timeout_is_clamped_to_minimum() {
        let sampler = TimeoutSampler::new();
        for _ in 0..100 {
            sampler.update_and_recalc(0);
        }
        assert!(sampler.stall_timeout() >= MIN_STALL_TIMEOUT_MS);
    }

    #[test]
    fn reset_reverts_to_conservative_maximum() {
        let sampler = TimeoutSampler::new();
        for _ in 0..100 {
            sampler.update_and_recalc(200);
        }
        sampler.reset();
        assert_eq!(sampler.stall_timeout(), MAX_STALL_TIMEOUT_MS);
    }
}
