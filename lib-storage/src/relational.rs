//! A relational `DataStorage` backend over `sqlx::AnyPool`, portable across
//! SQLite and PostgreSQL. The `UPSERT ... WHERE sequence_number <
//! excluded.sequence_number` guard is applied identically on both dialects;
//! [`crate::contract::validate_put`] is still run first so ownership and
//! compare-and-set violations surface as the right [`StorageError`] variant
//! rather than a silently-ignored no-op write.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lib_identity::{Fingerprint, Id, PeerInfo, Value};
use sqlx::any::AnyPoolOptions;
use sqlx::{AnyPool, Row};

use crate::contract::{validate_put, validate_put_peer, DataStorage, Lifecycle};
use crate::error::StorageError;
use crate::migrator;

pub struct RelationalStorage {
    pool: AnyPool,
}

/// Directory of `<version>_<description>.sql` migration files shipped with
/// this crate, scanned and applied in order at connect time.
fn migrations_dir() -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
}

impl RelationalStorage {
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = AnyPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;
        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        let migrations = migrator::load_from_dir(&migrations_dir())?;
        migrator::apply(&self.pool, &migrations, "lib-storage").await
    }

    async fn fetch_value_row(&self, id: &Id) -> Result<Option<Value>, StorageError> {
        let row = sqlx::query(
            "SELECT public_key, recipient, nonce, signature, sequence_number, data
             FROM dht_values WHERE id = ?",
        )
        .bind(id.to_hex())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        Ok(Some(row_to_value(&row)?))
    }

    async fn fetch_peer_row(&self, id: &Id, fingerprint: Fingerprint) -> Result<Option<PeerInfo>, StorageError> {
        let row = sqlx::query(
            "SELECT node_id, addr, nonce, sequence_number, extra_data, peer_signature, node_signature
             FROM dht_peers WHERE id = ? AND fingerprint = ?",
        )
        .bind(id.to_hex())
        .bind(fingerprint as i64)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        Ok(Some(row_to_peer(&row, *id)?))
    }
}

fn row_to_value(row: &sqlx::any::AnyRow) -> Result<Value, StorageError> {
    let public_key: Option<String> = row.try_get("public_key")?;
    let recipient: Option<String> = row.try_get("recipient")?;
    let nonce: Option<String> = row.try_get("nonce")?;
    let signature: Option<String> = row.try_get("signature")?;
    let sequence_number: i64 = row.try_get("sequence_number")?;
    let data: Vec<u8> = row.try_get("data")?;

    Ok(Value {
        public_key: public_key
            .map(|s| hex_to_array32(&s))
            .transpose()?,
        recipient: recipient.map(|s| hex_to_array32(&s)).transpose()?,
        nonce: nonce.map(|s| hex_to_array24(&s)).transpose()?,
        signature: signature.map(|s| hex_to_array64(&s)).transpose()?,
        sequence_number: sequence_number as u32,
        data,
    })
}

fn hex_to_array32(s: &str) -> Result<[u8; 32], StorageError> {
    let bytes = hex::decode(s).map_err(|e| StorageError::Migration(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| StorageError::Migration("expected 32-byte hex field".into()))
}

fn hex_to_array24(s: &str) -> Result<[u8; 24], StorageError> {
    let bytes = hex::decode(s).map_err(|e| StorageError::Migration(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| StorageError::Migration("expected 24-byte hex field".into()))
}

fn hex_to_array64(s: &str) -> Result<[u8; 64], StorageError> {
    let bytes = hex::decode(s).map_err(|e| StorageError::Migration(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| StorageError::Migration("expected 64-byte hex field".into()))
}

fn opt_hex(bytes: &Option<impl AsRef<[u8]>>) -> Option<String> {
    bytes.as_ref().map(|b| hex::encode(b.as_ref()))
}

#[async_trait]
impl DataStorage for RelationalStorage {
    async fn put_value(
        &self,
        value: Value,
        expected_sequence_number: Option<u64>,
        lifecycle: Lifecycle,
    ) -> Result<(), StorageError> {
        let id = value.id();
        let existing = self.fetch_value_row(&id).await?;
        validate_put(existing.as_ref(), &value, expected_sequence_number)?;

        let persistent = matches!(lifecycle, Lifecycle::Persistent);
        let expires_at = match lifecycle {
            Lifecycle::Persistent => None,
            Lifecycle::ExpiresAt(t) => Some(t.to_rfc3339()),
        };

        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO dht_values
                (id, public_key, recipient, nonce, signature, sequence_number, data, persistent, expires_at, created, updated, last_announced)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                public_key = excluded.public_key,
                recipient = excluded.recipient,
                nonce = excluded.nonce,
                signature = excluded.signature,
                sequence_number = excluded.sequence_number,
                data = excluded.data,
                persistent = excluded.persistent,
                expires_at = excluded.expires_at,
                updated = excluded.updated,
                last_announced = excluded.last_announced
             WHERE dht_values.sequence_number < excluded.sequence_number
                OR dht_values.public_key IS NULL",
        )
        .bind(id.to_hex())
        .bind(opt_hex(&value.public_key))
        .bind(opt_hex(&value.recipient))
        .bind(opt_hex(&value.nonce))
        .bind(opt_hex(&value.signature))
        .bind(value.sequence_number as i64)
        .bind(value.data.clone())
        .bind(persistent)
        .bind(expires_at)
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_value(&self, id: &Id) -> Result<Option<Value>, StorageError> {
        self.fetch_value_row(id).await
    }

    async fn get_values_page(&self, offset: usize, limit: usize) -> Result<Vec<Value>, StorageError> {
        let rows = sqlx::query(
            "SELECT public_key, recipient, nonce, signature, sequence_number, data
             FROM dht_values ORDER BY updated DESC, id LIMIT ? OFFSET ?",
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_value).collect()
    }

    async fn get_values_by_lifecycle(
        &self,
        persistent: bool,
        announced_before: DateTime<Utc>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Value>, StorageError> {
        let rows = sqlx::query(
            "SELECT public_key, recipient, nonce, signature, sequence_number, data
             FROM dht_values
             WHERE persistent = ? AND updated <= ?
             ORDER BY updated DESC, id LIMIT ? OFFSET ?",
        )
        .bind(persistent)
        .bind(announced_before.to_rfc3339())
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_value).collect()
    }

    async fn update_value_announced_time(&self, id: &Id) -> Result<(), StorageError> {
        sqlx::query("UPDATE dht_values SET updated = ?, last_announced = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_hex())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove_value(&self, id: &Id) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM dht_values WHERE id = ?")
            .bind(id.to_hex())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn put_peer(&self, peer: PeerInfo, lifecycle: Lifecycle) -> Result<(), StorageError> {
        let fingerprint = PeerInfo::fingerprint(&peer.node_id, &peer.addr);
        let existing = self.fetch_peer_row(&peer.id, fingerprint).await?;
        validate_put_peer(existing.as_ref(), &peer, None)?;

        let persistent = matches!(lifecycle, Lifecycle::Persistent);
        let expires_at = match lifecycle {
            Lifecycle::Persistent => None,
            Lifecycle::ExpiresAt(t) => Some(t.to_rfc3339()),
        };
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO dht_peers
                (id, fingerprint, node_id, addr, nonce, sequence_number, extra_data, peer_signature, node_signature, persistent, expires_at, created, updated, last_announced)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id, fingerprint) DO UPDATE SET
                node_id = excluded.node_id,
                addr = excluded.addr,
                nonce = excluded.nonce,
                sequence_number = excluded.sequence_number,
                extra_data = excluded.extra_data,
                peer_signature = excluded.peer_signature,
                node_signature = excluded.node_signature,
                persistent = excluded.persistent,
                expires_at = excluded.expires_at,
                updated = excluded.updated,
                last_announced = excluded.last_announced",
        )
        .bind(peer.id.to_hex())
        .bind(fingerprint as i64)
        .bind(peer.node_id.to_hex())
        .bind(peer.addr.to_string())
        .bind(hex::encode(peer.nonce))
        .bind(peer.sequence_number as i64)
        .bind(peer.extra_data.clone())
        .bind(hex::encode(peer.peer_signature))
        .bind(hex::encode(peer.node_signature))
        .bind(persistent)
        .bind(expires_at)
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_peer(&self, id: &Id, fingerprint: Fingerprint) -> Result<Option<PeerInfo>, StorageError> {
        self.fetch_peer_row(id, fingerprint).await
    }

    async fn get_peers(&self, id: &Id, limit: usize) -> Result<Vec<PeerInfo>, StorageError> {
        let rows = sqlx::query(
            "SELECT node_id, addr, nonce, sequence_number, extra_data, peer_signature, node_signature
             FROM dht_peers WHERE id = ? LIMIT ?",
        )
        .bind(id.to_hex())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| row_to_peer(row, *id)).collect()
    }

    async fn get_peers_matching(
        &self,
        id: &Id,
        expected_sequence_number: Option<u32>,
        limit: usize,
    ) -> Result<Vec<PeerInfo>, StorageError> {
        let rows = match expected_sequence_number {
            Some(expected) => {
                sqlx::query(
                    "SELECT node_id, addr, nonce, sequence_number, extra_data, peer_signature, node_signature
                     FROM dht_peers WHERE id = ? AND sequence_number > ? LIMIT ?",
                )
                .bind(id.to_hex())
                .bind(expected as i64)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT node_id, addr, nonce, sequence_number, extra_data, peer_signature, node_signature
                     FROM dht_peers WHERE id = ? LIMIT ?",
                )
                .bind(id.to_hex())
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(|row| row_to_peer(row, *id)).collect()
    }

    async fn get_peers_by_lifecycle(
        &self,
        persistent: bool,
        announced_before: DateTime<Utc>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<PeerInfo>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, node_id, addr, nonce, sequence_number, extra_data, peer_signature, node_signature
             FROM dht_peers
             WHERE persistent = ? AND updated <= ?
             ORDER BY updated DESC, id LIMIT ? OFFSET ?",
        )
        .bind(persistent)
        .bind(announced_before.to_rfc3339())
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let id_hex: String = row.try_get("id")?;
                let id = Id::from_hex(&id_hex).map_err(|e| StorageError::Migration(e.to_string()))?;
                row_to_peer(row, id)
            })
            .collect()
    }

    async fn update_peer_announced_time(&self, id: &Id, fingerprint: Fingerprint) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE dht_peers SET updated = ?, last_announced = ? WHERE id = ? AND fingerprint = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_hex())
        .bind(fingerprint as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_peer(&self, id: &Id, fingerprint: Fingerprint) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM dht_peers WHERE id = ? AND fingerprint = ?")
            .bind(id.to_hex())
            .bind(fingerprint as i64)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_peers(&self, id: &Id) -> Result<usize, StorageError> {
        let result = sqlx::query("DELETE FROM dht_peers WHERE id = ?")
            .bind(id.to_hex())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn purge(&self, now: DateTime<Utc>) -> Result<usize, StorageError> {
        let now_str = now.to_rfc3339();
        let values_result = sqlx::query(
            "DELETE FROM dht_values WHERE persistent = false AND expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(&now_str)
        .execute(&self.pool)
        .await?;

        let peers_result = sqlx::query(
            "DELETE FROM dht_peers WHERE persistent = false AND expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(&now_str)
        .execute(&self.pool)
        .await?;

        Ok((values_result.rows_affected() + peers_result.rows_affected()) as usize)
    }
}

fn row_to_peer(row: &sqlx::any::AnyRow, id: Id) -> Result<PeerInfo, StorageError> {
    let node_id: String = row.try_get("node_id")?;
    let addr: String = row.try_get("addr")?;
    let nonce: String = row.try_get("nonce")?;
    let sequence_number: i64 = row.try_get("sequence_number")?;
    let extra_data: Option<Vec<u8>> = row.try_get("extra_data")?;
    let peer_signature: String = row.try_get("peer_signature")?;
    let node_signature: String = row.try_get("node_signature")?;

    Ok(PeerInfo {
        id,
        node_id: Id::from_hex(&node_id).map_err(|e| StorageError::Migration(e.to_string()))?,
        addr: addr
            .parse()
            .map_err(|_| StorageError::Migration("invalid stored socket address".into()))?,
        nonce: hex_to_array24(&nonce)?,
        sequence_number: sequence_number as u32,
        extra_data,
        peer_signature: hex_to_array64(&peer_signature)?,
        node_signature: hex_to_array64(&node_signature)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_identity::NodeIdentity;

    async fn test_storage() -> RelationalStorage {
        RelationalStorage::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn immutable_value_roundtrip() {
        let storage = test_storage().await;
        let value = Value::immutable(b"hello".to_vec()).unwrap();
        storage
            .put_value(value.clone(), None, Lifecycle::Persistent)
            .await
            .unwrap();

        let got = storage.get_value(&value.id()).await.unwrap().unwrap();
        assert_eq!(got, value);
    }

    #[tokio::test]
    async fn mutable_value_upsert_enforces_monotonicity() {
        let storage = test_storage().await;
        let node = NodeIdentity::generate();
        let v1 = Value::signed(&node, 1, b"v1".to_vec()).unwrap();
        let v2 = Value::signed(&node, 2, b"v2".to_vec()).unwrap();
        let stale = Value::signed(&node, 1, b"stale".to_vec()).unwrap();

        storage.put_value(v1, None, Lifecycle::Persistent).await.unwrap();
        storage.put_value(v2.clone(), None, Lifecycle::Persistent).await.unwrap();

        let err = storage.put_value(stale, None, Lifecycle::Persistent).await;
        assert!(err.is_err());

        let got = storage.get_value(&v2.id()).await.unwrap().unwrap();
        assert_eq!(got.data, b"v2");
    }

    #[tokio::test]
    async fn peer_roundtrip() {
        let storage = test_storage().await;
        let node = NodeIdentity::generate();
        let addr: std::net::SocketAddr = "127.0.0.1:4001".parse().unwrap();
        let peer = PeerInfo::create(&node, &node, addr, 1, None);
        let id = peer.id;
        let fingerprint = PeerInfo::fingerprint(&peer.node_id, &peer.addr);

        storage.put_peer(peer.clone(), Lifecycle::Persistent).await.unwrap();
        let got = storage.get_peer(&id, fingerprint).await.unwrap().unwrap();
        assert_eq!(got, peer);
    }

    #[tokio::test]
    async fn peer_put_rejects_ownership_change() {
        let storage = test_storage().await;
        let a = NodeIdentity::generate();
        let b = NodeIdentity::generate();
        let addr: std::net::SocketAddr = "127.0.0.1:4002".parse().unwrap();

        let peer_a = PeerInfo::create(&a, &a, addr, 1, None);
        storage.put_peer(peer_a, Lifecycle::Persistent).await.unwrap();

        // Same (node_id, addr) pair means the same fingerprint; a different
        // identity announcing under it looks like a new peer, not an
        // ownership change, since `peer.id` differs. Force a collision by
        // reusing `a`'s node identity while swapping `b` in as the peer.
        let peer_b = PeerInfo::create(&b, &a, addr, 2, None);
        assert!(storage.put_peer(peer_b, Lifecycle::Persistent).await.is_err());
    }

    #[tokio::test]
    async fn get_values_page_orders_by_updated_desc() {
        let storage = test_storage().await;
        let older = Value::immutable(b"older".to_vec()).unwrap();
        storage.put_value(older.clone(), None, Lifecycle::Persistent).await.unwrap();
        let newer = Value::immutable(b"newer".to_vec()).unwrap();
        storage.put_value(newer.clone(), None, Lifecycle::Persistent).await.unwrap();

        let page = storage.get_values_page(0, 10).await.unwrap();
        assert_eq!(page.len(), 2);
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let storage = test_storage().await;
        let expired = Value::immutable(b"old".to_vec()).unwrap();
        let past = Utc::now() - chrono::Duration::hours(1);
        storage
            .put_value(expired.clone(), None, Lifecycle::ExpiresAt(past))
            .await
            .unwrap();

        let removed = storage.purge(Utc::now()).await.unwrap();
        assert_eq!(removed, 1);
        assert!(storage.get_value(&expired.id()).await.unwrap().is_none());
    }
}
