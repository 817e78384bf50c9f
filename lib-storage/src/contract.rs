//! The `DataStorage` contract: every backend (in-memory, relational) must
//! honor the same monotonicity, ownership, and expiration rules so callers
//! can swap backends without changing behavior.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lib_identity::{Fingerprint, Id, PeerInfo, Value};

use crate::error::StorageError;

/// A stored entry's retention policy: persistent entries survive the purge
/// loop indefinitely, expiring ones are dropped once `expires_at` passes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Lifecycle {
    Persistent,
    ExpiresAt(DateTime<Utc>),
}

impl Lifecycle {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self {
            Lifecycle::Persistent => false,
            Lifecycle::ExpiresAt(t) => *t <= now,
        }
    }
}

/// Contract every value/peer storage backend implements.
///
/// Monotonicity: a mutable value's `sequence_number` must strictly
/// increase on every write to the same id. Ownership: once an id holds a
/// value owned by a public key, only that same key may write to it again;
/// an immutable value can never be replaced by one under a different
/// owner, and a mutable slot can never be silently turned into an
/// unowned immutable one.
#[async_trait]
pub trait DataStorage: Send + Sync {
    async fn put_value(
        &self,
        value: Value,
        expected_sequence_number: Option<u64>,
        lifecycle: Lifecycle,
    ) -> Result<(), StorageError>;

    async fn get_value(&self, id: &Id) -> Result<Option<Value>, StorageError>;

    /// Pages through every stored value ordered by `updated DESC, id`.
    async fn get_values_page(&self, offset: usize, limit: usize) -> Result<Vec<Value>, StorageError>;

    /// Pages through stored values matching `persistent` whose `updated`
    /// timestamp is at or before `announced_before`, same ordering as
    /// [`Self::get_values_page`].
    async fn get_values_by_lifecycle(
        &self,
        persistent: bool,
        announced_before: DateTime<Utc>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Value>, StorageError>;

    /// Bumps a value's `last_announced`/`updated` timestamp without
    /// changing its body, so a re-announce of unchanged data still resets
    /// its purge clock.
    async fn update_value_announced_time(&self, id: &Id) -> Result<(), StorageError>;

    async fn remove_value(&self, id: &Id) -> Result<bool, StorageError>;

    async fn put_peer(&self, peer: PeerInfo, lifecycle: Lifecycle) -> Result<(), StorageError>;

    async fn get_peer(&self, id: &Id, fingerprint: Fingerprint) -> Result<Option<PeerInfo>, StorageError>;

    async fn get_peers(&self, id: &Id, limit: usize) -> Result<Vec<PeerInfo>, StorageError>;

    /// Peers announced for `id` with sequence number strictly greater than
    /// `expected_sequence_number` (all of them if `None`), up to `limit`.
    async fn get_peers_matching(
        &self,
        id: &Id,
        expected_sequence_number: Option<u32>,
        limit: usize,
    ) -> Result<Vec<PeerInfo>, StorageError>;

    /// Pages through peer rows matching `persistent` whose `updated`
    /// timestamp is at or before `announced_before`, ordered by
    /// `updated DESC, id`.
    async fn get_peers_by_lifecycle(
        &self,
        persistent: bool,
        announced_before: DateTime<Utc>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<PeerInfo>, StorageError>;

    /// Bumps a peer row's `last_announced`/`updated` timestamp.
    async fn update_peer_announced_time(
        &self,
        id: &Id,
        fingerprint: Fingerprint,
    ) -> Result<(), StorageError>;

    async fn remove_peer(&self, id: &Id, fingerprint: Fingerprint) -> Result<bool, StorageError>;

    /// Removes every peer row announced under `id`. Returns the count removed.
    async fn remove_peers(&self, id: &Id) -> Result<usize, StorageError>;

    /// Drops all expiring (non-persistent) entries whose expiration has
    /// passed as of `now`. Returns the number removed.
    async fn purge(&self, now: DateTime<Utc>) -> Result<usize, StorageError>;
}

/// Validates the monotonicity/ownership/CAS rules a backend must apply
/// before accepting `new_value` over `existing`, shared by every backend
/// so the rules live in exactly one place.
pub fn validate_put(
    existing: Option<&Value>,
    new_value: &Value,
    expected_sequence_number: Option<u64>,
) -> Result<(), StorageError> {
    new_value.is_valid()?;

    let Some(existing) = existing else {
        if let Some(expected) = expected_sequence_number {
            return Err(StorageError::SequenceNotExpected {
                expected,
                stored: 0,
            });
        }
        return Ok(());
    };

    if existing.public_key != new_value.public_key {
        return Err(StorageError::ImmutableSubstitutionFail);
    }

    if new_value.is_mutable() {
        if let Some(expected) = expected_sequence_number {
            if expected != existing.sequence_number as u64 {
                return Err(StorageError::SequenceNotExpected {
                    expected,
                    stored: existing.sequence_number as u64,
                });
            }
        }
        if new_value.sequence_number <= existing.sequence_number {
            return Err(StorageError::SequenceNotMonotonic {
                stored: existing.sequence_number as u64,
                new: new_value.sequence_number as u64,
            });
        }
    }

    Ok(())
}

/// The peer-storage analog of [`validate_put`]: same private-key-owner
/// preservation (a fingerprint row can never change which id it's
/// announced under) and sequence-number monotonicity, gated per
/// `(id, fingerprint)` rather than per id alone.
pub fn validate_put_peer(
    existing: Option<&PeerInfo>,
    new_peer: &PeerInfo,
    expected_sequence_number: Option<u32>,
) -> Result<(), StorageError> {
    let Some(existing) = existing else {
        if let Some(expected) = expected_sequence_number {
            return Err(StorageError::SequenceNotExpected {
                expected: expected as u64,
                stored: 0,
            });
        }
        return Ok(());
    };

    if existing.id != new_peer.id {
        return Err(StorageError::ImmutableSubstitutionFail);
    }

    if let Some(expected) = expected_sequence_number {
        if expected != existing.sequence_number {
            return Err(StorageError::SequenceNotExpected {
                expected: expected as u64,
                stored: existing.sequence_number as u64,
            });
        }
    }
    if new_peer.sequence_number <= existing.sequence_number {
        return Err(StorageError::SequenceNotMonotonic {
            stored: existing.sequence_number as u64,
            new: new_peer.sequence_number as u64,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_identity::NodeIdentity;

    #[test]
    fn immutable_first_write_is_accepted() {
        let v = Value::immutable(b"data".to_vec()).unwrap();
        validate_put(None, &v, None).unwrap();
    }

    #[test]
    fn mutable_rejects_non_increasing_sequence() {
        let node = NodeIdentity::generate();
        let v1 = Value::signed(&node, 5, b"v1".to_vec()).unwrap();
        let v2 = Value::signed(&node, 5, b"v2".to_vec()).unwrap();

        let err = validate_put(Some(&v1), &v2, None);
        assert!(matches!(
            err,
            Err(StorageError::SequenceNotMonotonic { .. })
        ));
    }

    #[test]
    fn mutable_rejects_ownership_change() {
        let a = NodeIdentity::generate();
        let b = NodeIdentity::generate();
        let v1 = Value::signed(&a, 1, b"v1".to_vec()).unwrap();
        let v2 = Value::signed(&b, 2, b"v2".to_vec()).unwrap();

        let err = validate_put(Some(&v1), &v2, None);
        assert!(matches!(
            err,
            Err(StorageError::ImmutableSubstitutionFail)
        ));
    }

    #[test]
    fn compare_and_set_rejects_mismatched_expectation() {
        let node = NodeIdentity::generate();
        let v1 = Value::signed(&node, 1, b"v1".to_vec()).unwrap();
        let v2 = Value::signed(&node, 2, b"v2".to_vec()).unwrap();

        let err = validate_put(Some(&v1), &v2, Some(99));
        assert!(matches!(
            err,
            Err(StorageError::SequenceNotExpected { .. })
        ));
    }

    #[test]
    fn compare_and_set_accepts_matching_expectation() {
        let node = NodeIdentity::generate();
        let v1 = Value::signed(&node, 1, b"v1".to_vec()).unwrap();
        let v2 = Value::signed(&node, 2, b"v2".to_vec()).unwrap();

        validate_put(Some(&v1), &v2, Some(1)).unwrap();
    }

    fn test_peer(node: &NodeIdentity, sequence_number: u32) -> PeerInfo {
        let addr: std::net::SocketAddr = "127.0.0.1:4001".parse().unwrap();
        PeerInfo::create(node, node, addr, sequence_number, None)
    }

    #[test]
    fn peer_first_write_is_accepted() {
        let node = NodeIdentity::generate();
        let p = test_peer(&node, 1);
        validate_put_peer(None, &p, None).unwrap();
    }

    #[test]
    fn peer_rejects_non_increasing_sequence() {
        let node = NodeIdentity::generate();
        let p1 = test_peer(&node, 5);
        let p2 = test_peer(&node, 5);

        let err = validate_put_peer(Some(&p1), &p2, None);
        assert!(matches!(err, Err(StorageError::SequenceNotMonotonic { .. })));
    }

    #[test]
    fn peer_rejects_ownership_change() {
        let a = NodeIdentity::generate();
        let b = NodeIdentity::generate();
        let p1 = test_peer(&a, 1);
        let p2 = test_peer(&b, 2);

        let err = validate_put_peer(Some(&p1), &p2, None);
        assert!(matches!(err, Err(StorageError::ImmutableSubstitutionFail)));
    }

    #[test]
    fn peer_compare_and_set_accepts_matching_expectation() {
        let node = NodeIdentity::generate();
        let p1 = test_peer(&node, 1);
        let p2 = test_peer(&node, 2);

        validate_put_peer(Some(&p1), &p2, Some(1)).unwrap();
    }
}
