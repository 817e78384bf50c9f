//! Blacklisting and suspicious-behavior tracking for remote peers.

use std::collections::{HashSet, VecDeque};
use std::net::IpAddr;
use std::time::{Duration, Instant};

use lib_identity::Id;
use parking_lot::Mutex;

/// Explicit union of banned ids and hosts, populated externally (config,
/// operator action, or a higher-level reputation system).
#[derive(Default)]
pub struct Blacklist {
    ids: Mutex<HashSet<Id>>,
    hosts: Mutex<HashSet<IpAddr>>,
}

impl Blacklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ban_id(&self, id: Id) {
        self.ids.lock().insert(id);
    }

    pub fn ban_host(&self, host: IpAddr) {
        self.hosts.lock().insert(host);
    }

    pub fn is_banned(&self, host: IpAddr, id: Option<Id>) -> bool {
        if self.hosts.lock().contains(&host) {
            return true;
        }
        match id {
            Some(id) => self.ids.lock().contains(&id),
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Violation {
    MalformedFrame,
    SourceInconsistentResponse,
    IdAddressInconsistency,
}

const WINDOW: Duration = Duration::from_secs(60);
const AUTO_BAN_THRESHOLD: usize = 5;

struct HostRecord {
    observations: VecDeque<Instant>,
    banned: bool,
}

/// Tracks malformed frames, source-inconsistent responses, and
/// id/address inconsistencies per host, auto-banning hosts that exceed
/// [`AUTO_BAN_THRESHOLD`] observations within a sliding 60 s window.
#[derive(Default)]
pub struct SuspiciousNodeDetector {
    hosts: Mutex<std::collections::HashMap<IpAddr, HostRecord>>,
}

impl SuspiciousNodeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, host: IpAddr, _violation: Violation) {
        let now = Instant::now();
        let mut hosts = self.hosts.lock();
        let record = hosts.entry(host).or_insert_with(|| HostRecord {
            observations: VecDeque::new(),
            banned: false,
        });

        record.observations.push_back(now);
        while let Some(&front) = record.observations.front() {
            if now.duration_since(front) > WINDOW {
                record.observations.pop_front();
            } else {
                break;
            }
        }

        if record.observations.len() >= AUTO_BAN_THRESHOLD {
            record.banned = true;
        }
    }

    pub fn is_banned(&self, host: IpAddr) -> bool {
        self.hosts
            .lock()
            .get(&host)
            .map(|r| r.banned)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blacklist_bans_explicit_hosts_and_ids() {
        let blacklist = Blacklist::new();
        let host: IpAddr = "192.168.1.10".parse().unwrap();
        let id = Id::random();

        assert!(!blacklist.is_banned(host, Some(id)));
        blacklist.ban_host(host);
        assert!(blacklist.is_banned(host, None));

        let other: IpAddr = "192.168.1.11".parse().unwrap();
        blacklist.ban_id(id);
        assert!(blacklist.is_banned(other, Some(id)));
    }

    #[test]
    fn detector_auto_bans_after_threshold_violations() {
        let detector = SuspiciousNodeDetector::new();
        let host: IpAddr = "192.168.1.20".parse().unwrap();

        assert!(!detector.is_banned(host));
        for _ in 0..AUTO_BAN_THRESHOLD {
            detector.record(host, Violation::MalformedFrame);
        }
        assert!(detector.is_banned(host));
    }

    #[test]
    fn detector_tracks_hosts_independently() {
        let detector = SuspiciousNodeDetector::new();
        let a: IpAddr = "192.168.1.30".parse().unwrap();
        let b: IpAddr = "192.168.1.31".parse().unwrap();

        for _ in 0..AUTO_BAN_THRESHOLD {
            detector.record(a, Violation::SourceInconsistentResponse);
        }
        assert!(detector.is_banned(a));
        assert!(!detector.is_banned(b));
    }
}
