//! Versioned schema migrations for the relational backend.
//!
//! Migration files are named `<version>_<description>.sql`. Each is hashed
//! with SHA-256 at registration time; if a previously-applied migration's
//! file content no longer matches its recorded hash, the migrator refuses
//! to proceed rather than risk applying drifted SQL.

use std::path::Path;

use sqlx::any::AnyKind;
use sqlx::{AnyPool, Row};

use crate::error::StorageError;

/// A single migration, identified by a strictly increasing `version`.
pub struct Migration {
    pub version: i64,
    pub description: String,
    pub sql: String,
    /// Precomputed digest for migrations loaded from disk via
    /// [`load_from_dir`], which hashes the file incrementally as it streams
    /// it in rather than rehashing the buffered string afterward.
    precomputed_hash: Option<String>,
}

impl Migration {
    pub fn new(version: i64, description: impl Into<String>, sql: impl Into<String>) -> Self {
        Migration {
            version,
            description: description.into(),
            sql: sql.into(),
            precomputed_hash: None,
        }
    }

    fn hash(&self) -> String {
        self.precomputed_hash
            .clone()
            .unwrap_or_else(|| hex::encode(lib_crypto::sha256(self.sql.as_bytes())))
    }
}

/// Loads every `<version>_<description>.sql` file directly under `dir`,
/// stream-hashing each file's bytes with SHA-256 as it's read in chunks
/// rather than buffering the whole file before hashing. Files that don't
/// match the naming convention are skipped; the result is sorted by
/// version, letting [`apply`] run them in order regardless of directory
/// iteration order.
pub fn load_from_dir(dir: &Path) -> Result<Vec<Migration>, StorageError> {
    use sha2::{Digest, Sha256};
    use std::io::Read;

    let mut migrations = Vec::new();
    let entries = std::fs::read_dir(dir)
        .map_err(|e| StorageError::Migration(format!("reading migrations dir {}: {e}", dir.display())))?;

    for entry in entries {
        let entry = entry.map_err(|e| StorageError::Migration(e.to_string()))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("sql") {
            continue;
        }
        let file_name = match path.file_stem().and_then(|s| s.to_str()) {
            Some(s) => s,
            None => continue,
        };
        let Some((version_str, description)) = file_name.split_once('_') else {
            continue;
        };
        let Ok(version) = version_str.parse::<i64>() else {
            continue;
        };

        let mut file = std::fs::File::open(&path)
            .map_err(|e| StorageError::Migration(format!("opening {}: {e}", path.display())))?;
        let mut hasher = Sha256::new();
        let mut bytes = Vec::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = file
                .read(&mut buf)
                .map_err(|e| StorageError::Migration(format!("reading {}: {e}", path.display())))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            bytes.extend_from_slice(&buf[..n]);
        }
        let sql = String::from_utf8(bytes)
            .map_err(|e| StorageError::Migration(format!("{} is not valid utf-8: {e}", path.display())))?;

        migrations.push(Migration {
            version,
            description: description.replace('_', " "),
            sql,
            precomputed_hash: Some(hex::encode(hasher.finalize())),
        });
    }

    migrations.sort_by_key(|m| m.version);
    Ok(migrations)
}

/// Splits a migration file into individual statements, respecting single-
/// and double-quoted strings, `--`/`/* */` comments, PostgreSQL dollar
/// quoting, and `BEGIN ... END` blocks so a `;` inside any of those does
/// not end the statement early.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = sql.chars().peekable();
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut in_line_comment = false;
    let mut in_block_comment = false;
    let mut dollar_tag: Option<String> = None;
    let mut begin_end_depth = 0usize;

    while let Some(c) = chars.next() {
        current.push(c);

        if in_line_comment {
            if c == '\n' {
                in_line_comment = false;
            }
            continue;
        }
        if in_block_comment {
            if c == '*' && chars.peek() == Some(&'/') {
                current.push(chars.next().unwrap());
                in_block_comment = false;
            }
            continue;
        }
        if let Some(tag) = &dollar_tag {
            if c == '$' && current.ends_with(&format!("{}$", tag)) {
                dollar_tag = None;
            }
            continue;
        }
        if in_single_quote {
            if c == '\'' {
                in_single_quote = false;
            }
            continue;
        }
        if in_double_quote {
            if c == '"' {
                in_double_quote = false;
            }
            continue;
        }

        match c {
            '\'' => in_single_quote = true,
            '"' => in_double_quote = true,
            '-' if chars.peek() == Some(&'-') => {
                current.push(chars.next().unwrap());
                in_line_comment = true;
            }
            '/' if chars.peek() == Some(&'*') => {
                current.push(chars.next().unwrap());
                in_block_comment = true;
            }
            '$' => {
                // Collect a `$tag$` dollar-quote opener.
                let mut tag = String::from("$");
                while let Some(&next) = chars.peek() {
                    if next == '$' {
                        tag.push(chars.next().unwrap());
                        current.push_str(&tag[1..]);
                        current.push('$');
                        break;
                    }
                    if next.is_alphanumeric() || next == '_' {
                        tag.push(next);
                        current.push(chars.next().unwrap());
                    } else {
                        break;
                    }
                }
                if tag.ends_with('$') {
                    dollar_tag = Some(tag);
                }
            }
            ';' if begin_end_depth == 0 => {
                let trimmed = current.trim().trim_end_matches(';').trim().to_string();
                if !trimmed.is_empty() {
                    statements.push(trimmed);
                }
                current.clear();
            }
            _ => {
                let upper_tail: String = current
                    .chars()
                    .rev()
                    .take(5)
                    .collect::<String>()
                    .chars()
                    .rev()
                    .collect();
                let upper_tail = upper_tail.to_uppercase();
                if upper_tail.ends_with("BEGIN") {
                    begin_end_depth += 1;
                } else if upper_tail.ends_with(" END") || upper_tail == "END" {
                    begin_end_depth = begin_end_depth.saturating_sub(1);
                }
            }
        }
    }

    let trimmed = current.trim().to_string();
    if !trimmed.is_empty() {
        statements.push(trimmed);
    }
    statements
}

/// Applies any migrations in `migrations` (sorted by version) that haven't
/// already been recorded in `schema_versions`, each inside its own
/// transaction. `applied_by` identifies the process/operator running the
/// migration, recorded alongside each version for audit purposes.
pub async fn apply(pool: &AnyPool, migrations: &[Migration], applied_by: &str) -> Result<(), StorageError> {
    let dialect = pool.any_kind();

    let create_table = match dialect {
        AnyKind::Postgres => {
            "CREATE TABLE IF NOT EXISTS schema_versions (
                version BIGINT PRIMARY KEY,
                description TEXT NOT NULL,
                sha256 TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                applied_by TEXT NOT NULL,
                consumed_time TIMESTAMPTZ NOT NULL DEFAULT now(),
                success BOOLEAN NOT NULL
            )"
        }
        _ => {
            "CREATE TABLE IF NOT EXISTS schema_versions (
                version INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                sha256 TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                applied_by TEXT NOT NULL,
                consumed_time TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                success BOOLEAN NOT NULL
            )"
        }
    };
    sqlx::query(create_table).execute(pool).await?;

    let mut sorted: Vec<&Migration> = migrations.iter().collect();
    sorted.sort_by_key(|m| m.version);

    for migration in sorted {
        let row = sqlx::query("SELECT sha256 FROM schema_versions WHERE version = ?")
            .bind(migration.version)
            .fetch_optional(pool)
            .await?;

        if let Some(row) = row {
            let recorded_hash: String = row.try_get("sha256")?;
            if recorded_hash != migration.hash() {
                return Err(StorageError::Migration(format!(
                    "migration {} content hash mismatch: recorded {} but file hashes to {}",
                    migration.version,
                    recorded_hash,
                    migration.hash()
                )));
            }
            continue;
        }

        let mut tx = pool.begin().await?;
        for statement in split_statements(&migration.sql) {
            sqlx::query(&statement).execute(&mut *tx).await?;
        }
        sqlx::query(
            "INSERT INTO schema_versions (version, description, sha256, applied_by, success)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(migration.version)
        .bind(&migration.description)
        .bind(migration.hash())
        .bind(applied_by)
        .bind(true)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(version = migration.version, "applied migration");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_simple_statements() {
        let sql = "CREATE TABLE a (id INTEGER); CREATE TABLE b (id INTEGER);";
        let statements = split_statements(sql);
        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn ignores_semicolons_inside_quoted_strings() {
        let sql = "INSERT INTO t (s) VALUES ('a;b'); INSERT INTO t (s) VALUES ('c');";
        let statements = split_statements(sql);
        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn ignores_semicolons_inside_line_comments() {
        let sql = "-- comment; with semicolon\nCREATE TABLE a (id INTEGER);";
        let statements = split_statements(sql);
        assert_eq!(statements.len(), 1);
    }

    #[tokio::test]
    async fn applies_migrations_in_order_and_records_versions() {
        let pool = sqlx::any::AnyPoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();

        let migrations = vec![
            Migration::new(1, "create values", "CREATE TABLE values_tbl (id TEXT PRIMARY KEY);"),
            Migration::new(2, "create peers", "CREATE TABLE peers_tbl (id TEXT PRIMARY KEY);"),
        ];

        apply(&pool, &migrations, "test-harness").await.unwrap();

        let count: i64 = sqlx::query("SELECT COUNT(*) AS c FROM schema_versions")
            .fetch_one(&pool)
            .await
            .unwrap()
            .try_get("c")
            .unwrap();
        assert_eq!(count, 2);

        // Re-applying is a no-op, not an error.
        apply(&pool, &migrations, "test-harness").await.unwrap();
    }

    #[tokio::test]
    async fn rejects_content_drift_in_applied_migration() {
        let pool = sqlx::any::AnyPoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();

        let original = vec![Migration::new(1, "create t", "CREATE TABLE t (id TEXT);")];
        apply(&pool, &original, "test-harness").await.unwrap();

        let drifted = vec![Migration::new(1, "create t", "CREATE TABLE t (id INTEGER);")];
        let err = apply(&pool, &drifted, "test-harness").await;
        assert!(matches!(err, Err(StorageError::Migration(_))));
    }

    #[test]
    fn loads_and_sorts_migrations_from_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("2_add_indexes.sql"),
            "CREATE INDEX idx ON t (id);",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("1_create_t.sql"),
            "CREATE TABLE t (id TEXT);",
        )
        .unwrap();
        std::fs::write(dir.path().join("not_a_migration.txt"), "ignored").unwrap();

        let migrations = load_from_dir(dir.path()).unwrap();
        assert_eq!(migrations.len(), 2);
        assert_eq!(migrations[0].version, 1);
        assert_eq!(migrations[0].description, "create t");
        assert_eq!(migrations[1].version, 2);
    }

    #[tokio::test]
    async fn applies_migrations_loaded_from_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("1_create_t.sql"),
            "CREATE TABLE t (id TEXT PRIMARY KEY);",
        )
        .unwrap();
        let migrations = load_from_dir(dir.path()).unwrap();

        let pool = sqlx::any::AnyPoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        apply(&pool, &migrations, "test-harness").await.unwrap();

        let applied_by: String = sqlx::query("SELECT applied_by FROM schema_versions WHERE version = 1")
            .fetch_one(&pool)
            .await
            .unwrap()
            .try_get("applied_by")
            .unwrap();
        assert_eq!(applied_by, "test-harness");
    }
}
