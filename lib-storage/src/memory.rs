//! An in-memory `DataStorage` backend: a single-process node's default
//! store, and the reference implementation the relational backend's
//! behavior is tested against.
//!
//! Two optional knobs mirror the teacher's `DhtStorage`: a byte-size
//! `capacity` that evicts the oldest values once exceeded, and a
//! `snapshot_path` for an atomic-write/rename persistence fallback used
//! by tests and single-node deployments that don't run the relational
//! backend.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lib_identity::{Fingerprint, Id, PeerInfo, Value};
use serde::{Deserialize, Serialize};

use crate::contract::{validate_put, validate_put_peer, DataStorage, Lifecycle};
use crate::error::StorageError;

struct ValueEntry {
    value: Value,
    lifecycle: Lifecycle,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

struct PeerEntry {
    peer: PeerInfo,
    lifecycle: Lifecycle,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotEntry {
    value: Value,
    lifecycle: Lifecycle,
}

/// On-disk snapshot format, versioned in case the shape ever needs to
/// change. Entries are sorted by id so two snapshots of the same state
/// serialize to the same bytes.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    values: Vec<(Id, SnapshotEntry)>,
}

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Default)]
pub struct InMemoryStorage {
    values: RwLock<HashMap<Id, ValueEntry>>,
    peers: RwLock<HashMap<Id, HashMap<Fingerprint, PeerEntry>>>,
    insertion_order: RwLock<VecDeque<Id>>,
    capacity_bytes: Option<usize>,
    snapshot_path: Option<PathBuf>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evicts the oldest values once total stored bytes exceed `bytes`.
    pub fn with_capacity_bytes(mut self, bytes: usize) -> Self {
        self.capacity_bytes = Some(bytes);
        self
    }

    /// Enables the atomic-write snapshot fallback at `path`.
    pub fn with_snapshot_path(mut self, path: PathBuf) -> Self {
        self.snapshot_path = Some(path);
        self
    }

    fn current_usage(values: &HashMap<Id, ValueEntry>) -> usize {
        values.values().map(|e| e.value.data.len()).sum()
    }

    /// Drops the oldest inserted values until usage is back under
    /// `capacity_bytes`, or there's nothing left to evict.
    fn enforce_capacity(&self, values: &mut HashMap<Id, ValueEntry>) {
        let Some(capacity) = self.capacity_bytes else {
            return;
        };
        let mut order = self.insertion_order.write().expect("lock poisoned");
        while Self::current_usage(values) > capacity {
            let Some(oldest) = order.pop_front() else {
                break;
            };
            values.remove(&oldest);
        }
    }

    /// Writes the current values to `path` via a temp-file-then-rename,
    /// fsyncing the file (and, on POSIX, its parent directory) before the
    /// rename lands so a crash mid-write never leaves a corrupt snapshot.
    pub async fn save_to_file(&self, path: &Path) -> Result<(), StorageError> {
        let mut entries: Vec<(Id, SnapshotEntry)> = {
            let values = self.values.read().expect("lock poisoned");
            values
                .iter()
                .map(|(id, entry)| {
                    (
                        *id,
                        SnapshotEntry {
                            value: entry.value.clone(),
                            lifecycle: entry.lifecycle,
                        },
                    )
                })
                .collect()
        };
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            values: entries,
        };
        let bytes = serde_json::to_vec(&snapshot)
            .map_err(|e| StorageError::Other(format!("snapshot encode failed: {e}")))?;

        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || atomic_write(&path, &bytes))
            .await
            .map_err(|e| StorageError::Other(format!("spawn_blocking failed: {e}")))?
            .map_err(|e| StorageError::Other(format!("snapshot write failed: {e}")))
    }

    /// Saves to the path passed to [`Self::with_snapshot_path`]. No-op
    /// if the backend wasn't configured with one.
    pub async fn save_snapshot(&self) -> Result<(), StorageError> {
        match &self.snapshot_path {
            Some(path) => self.save_to_file(path).await,
            None => Ok(()),
        }
    }

    /// Loads from the path passed to [`Self::with_snapshot_path`]. No-op
    /// if the backend wasn't configured with one.
    pub async fn load_snapshot(&self) -> Result<(), StorageError> {
        match &self.snapshot_path {
            Some(path) => self.load_from_file(path).await,
            None => Ok(()),
        }
    }

    /// Loads values from a snapshot written by [`Self::save_to_file`],
    /// merging them into the current store. Missing file is not an
    /// error: a fresh node simply starts empty.
    pub async fn load_from_file(&self, path: &Path) -> Result<(), StorageError> {
        let read_path = path.to_path_buf();
        let bytes = tokio::task::spawn_blocking(move || {
            if !read_path.exists() {
                return Ok(None);
            }
            std::fs::read(&read_path).map(Some)
        })
        .await
        .map_err(|e| StorageError::Other(format!("spawn_blocking failed: {e}")))?
        .map_err(|e| StorageError::Other(format!("snapshot read failed: {e}")))?;

        let Some(bytes) = bytes else {
            return Ok(());
        };
        let snapshot: Snapshot = serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::Other(format!("snapshot decode failed: {e}")))?;

        let mut values = self.values.write().expect("lock poisoned");
        let mut order = self.insertion_order.write().expect("lock poisoned");
        let now = Utc::now();
        for (id, entry) in snapshot.values {
            order.push_back(id);
            values.insert(
                id,
                ValueEntry {
                    value: entry.value,
                    lifecycle: entry.lifecycle,
                    created: now,
                    updated: now,
                },
            );
        }
        drop(order);
        self.enforce_capacity(&mut values);
        Ok(())
    }
}

/// Writes to a `.tmp` sibling, fsyncs it, then renames it into place.
fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension("tmp");
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    if let Some(dir) = path.parent() {
        if let Ok(dir_handle) = std::fs::File::open(dir) {
            let _ = dir_handle.sync_all();
        }
    }
    Ok(())
}

#[async_trait]
impl DataStorage for InMemoryStorage {
    async fn put_value(
        &self,
        value: Value,
        expected_sequence_number: Option<u64>,
        lifecycle: Lifecycle,
    ) -> Result<(), StorageError> {
        let mut values = self.values.write().expect("lock poisoned");
        let id = value.id();
        let existing = values.get(&id).map(|e| &e.value);
        validate_put(existing, &value, expected_sequence_number)?;

        let now = Utc::now();
        let created = values.get(&id).map(|e| e.created).unwrap_or(now);
        values.insert(
            id,
            ValueEntry {
                value,
                lifecycle,
                created,
                updated: now,
            },
        );
        self.insertion_order.write().expect("lock poisoned").push_back(id);
        self.enforce_capacity(&mut values);
        Ok(())
    }

    async fn get_value(&self, id: &Id) -> Result<Option<Value>, StorageError> {
        let values = self.values.read().expect("lock poisoned");
        Ok(values.get(id).map(|e| e.value.clone()))
    }

    async fn get_values_page(&self, offset: usize, limit: usize) -> Result<Vec<Value>, StorageError> {
        let values = self.values.read().expect("lock poisoned");
        let mut entries: Vec<&ValueEntry> = values.values().collect();
        entries.sort_by(|a, b| b.updated.cmp(&a.updated).then_with(|| a.value.id().cmp(&b.value.id())));
        Ok(entries
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|e| e.value.clone())
            .collect())
    }

    async fn get_values_by_lifecycle(
        &self,
        persistent: bool,
        announced_before: DateTime<Utc>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Value>, StorageError> {
        let values = self.values.read().expect("lock poisoned");
        let mut entries: Vec<&ValueEntry> = values
            .values()
            .filter(|e| matches!(e.lifecycle, Lifecycle::Persistent) == persistent)
            .filter(|e| e.updated <= announced_before)
            .collect();
        entries.sort_by(|a, b| b.updated.cmp(&a.updated).then_with(|| a.value.id().cmp(&b.value.id())));
        Ok(entries
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|e| e.value.clone())
            .collect())
    }

    async fn update_value_announced_time(&self, id: &Id) -> Result<(), StorageError> {
        let mut values = self.values.write().expect("lock poisoned");
        if let Some(entry) = values.get_mut(id) {
            entry.updated = Utc::now();
        }
        Ok(())
    }

    async fn remove_value(&self, id: &Id) -> Result<bool, StorageError> {
        let mut values = self.values.write().expect("lock poisoned");
        Ok(values.remove(id).is_some())
    }

    async fn put_peer(&self, peer: PeerInfo, lifecycle: Lifecycle) -> Result<(), StorageError> {
        let fingerprint = PeerInfo::fingerprint(&peer.node_id, &peer.addr);
        let mut peers = self.peers.write().expect("lock poisoned");
        let by_fingerprint = peers.entry(peer.id).or_default();
        let existing = by_fingerprint.get(&fingerprint).map(|e| &e.peer);
        validate_put_peer(existing, &peer, None)?;

        let now = Utc::now();
        let created = by_fingerprint.get(&fingerprint).map(|e| e.created).unwrap_or(now);
        by_fingerprint.insert(
            fingerprint,
            PeerEntry {
                peer,
                lifecycle,
                created,
                updated: now,
            },
        );
        Ok(())
    }

    async fn get_peer(&self, id: &Id, fingerprint: Fingerprint) -> Result<Option<PeerInfo>, StorageError> {
        let peers = self.peers.read().expect("lock poisoned");
        Ok(peers
            .get(id)
            .and_then(|by_fingerprint| by_fingerprint.get(&fingerprint))
            .map(|e| e.peer.clone()))
    }

    async fn get_peers(&self, id: &Id, limit: usize) -> Result<Vec<PeerInfo>, StorageError> {
        let peers = self.peers.read().expect("lock poisoned");
        Ok(peers
            .get(id)
            .map(|by_fingerprint| {
                by_fingerprint
                    .values()
                    .take(limit)
                    .map(|e| e.peer.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_peers_matching(
        &self,
        id: &Id,
        expected_sequence_number: Option<u32>,
        limit: usize,
    ) -> Result<Vec<PeerInfo>, StorageError> {
        let peers = self.peers.read().expect("lock poisoned");
        Ok(peers
            .get(id)
            .map(|by_fingerprint| {
                by_fingerprint
                    .values()
                    .filter(|e| {
                        expected_sequence_number
                            .is_none_or(|expected| e.peer.sequence_number > expected)
                    })
                    .take(limit)
                    .map(|e| e.peer.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_peers_by_lifecycle(
        &self,
        persistent: bool,
        announced_before: DateTime<Utc>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<PeerInfo>, StorageError> {
        let peers = self.peers.read().expect("lock poisoned");
        let mut entries: Vec<&PeerEntry> = peers
            .values()
            .flat_map(|by_fingerprint| by_fingerprint.values())
            .filter(|e| matches!(e.lifecycle, Lifecycle::Persistent) == persistent)
            .filter(|e| e.updated <= announced_before)
            .collect();
        entries.sort_by(|a, b| b.updated.cmp(&a.updated).then_with(|| a.peer.id.cmp(&b.peer.id)));
        Ok(entries
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|e| e.peer.clone())
            .collect())
    }

    async fn update_peer_announced_time(
        &self,
        id: &Id,
        fingerprint: Fingerprint,
    ) -> Result<(), StorageError> {
        let mut peers = self.peers.write().expect("lock poisoned");
        if let Some(entry) = peers.get_mut(id).and_then(|by_fingerprint| by_fingerprint.get_mut(&fingerprint)) {
            entry.updated = Utc::now();
        }
        Ok(())
    }

    async fn remove_peer(&self, id: &Id, fingerprint: Fingerprint) -> Result<bool, StorageError> {
        let mut peers = self.peers.write().expect("lock poisoned");
        Ok(peers
            .get_mut(id)
            .map(|by_fingerprint| by_fingerprint.remove(&fingerprint).is_some())
            .unwrap_or(false))
    }

    async fn remove_peers(&self, id: &Id) -> Result<usize, StorageError> {
        let mut peers = self.peers.write().expect("lock poisoned");
        Ok(peers.remove(id).map(|by_fingerprint| by_fingerprint.len()).unwrap_or(0))
    }

    async fn purge(&self, now: DateTime<Utc>) -> Result<usize, StorageError> {
        let mut removed = 0;

        let mut values = self.values.write().expect("lock poisoned");
        values.retain(|_, entry| {
            let keep = !entry.lifecycle.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        drop(values);

        let mut peers = self.peers.write().expect("lock poisoned");
        for by_fingerprint in peers.values_mut() {
            by_fingerprint.retain(|_, entry| {
                let keep = !entry.lifecycle.is_expired(now);
                if !keep {
                    removed += 1;
                }
                keep
            });
        }
        peers.retain(|_, by_fingerprint| !by_fingerprint.is_empty());

        Ok(removed)
    }
}
