//! SQLite-backed persistence, via `sqlx` with WAL journaling.
//!
//! Paths are hex-encoded segment-by-segment and joined with `.`, so that a
//! prefix match for "this path or a descendant of it" is a plain SQL
//! `LIKE path || '.%'` with no escaping concerns (the hex alphabet never
//! contains `.`, `%`, or `_`).

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path as FsPath;
use std::str::FromStr;

use super::{LeafRecord, PersistedNode, PersistenceBackend, PersistenceError, Result};
use crate::value::TypeTag;

/// Current schema version. Increment when adding a migration.
pub const SCHEMA_VERSION: i64 = 1;

pub const CREATE_TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS schema_version (version BIGINT PRIMARY KEY)",
    "CREATE TABLE IF NOT EXISTS nodes (
        path TEXT PRIMARY KEY NOT NULL,
        kind TEXT NOT NULL,
        type_tag TEXT,
        encoded TEXT,
        timestamp_ms BIGINT NOT NULL
    )",
];

pub const CREATE_INDEXES: &[&str] = &["CREATE INDEX IF NOT EXISTS idx_nodes_path ON nodes(path)"];

pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    pub async fn open(path: &FsPath) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::connect(options).await
    }

    /// A private, shared-cache in-memory database. Each call gets its own
    /// isolated instance, unlike a bare `sqlite::memory:` pool where every
    /// connection in the pool would otherwise see a different database.
    pub async fn in_memory() -> Result<Self> {
        let name = format!("ggconfig-{}", std::process::id());
        let uri = format!("file:{name}?mode=memory&cache=shared");
        let options = SqliteConnectOptions::from_str(&uri).map_err(sqlx_err)?;
        Self::connect(options).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self> {
        let options = options
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_millis(5000));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(sqlx_err)?;

        let backend = SqliteBackend { pool };
        backend.initialize_schema().await?;
        Ok(backend)
    }

    async fn initialize_schema(&self) -> Result<()> {
        for statement in CREATE_TABLES {
            sqlx::query(statement).execute(&self.pool).await.map_err(sqlx_err)?;
        }

        let row: Option<(i64,)> = sqlx::query_as("SELECT version FROM schema_version")
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_err)?;

        match row {
            None => {
                sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
                    .bind(SCHEMA_VERSION)
                    .execute(&self.pool)
                    .await
                    .map_err(sqlx_err)?;
            }
            Some((current,)) if current < SCHEMA_VERSION => {
                tracing::warn!(
                    current,
                    target = SCHEMA_VERSION,
                    "no migration path is defined yet for this schema version gap"
                );
                return Err(PersistenceError::Corrupt {
                    path: String::new(),
                    reason: format!(
                        "schema at version {current}, expected {SCHEMA_VERSION}, no migration registered"
                    ),
                });
            }
            _ => {}
        }

        for statement in CREATE_INDEXES {
            sqlx::query(statement).execute(&self.pool).await.map_err(sqlx_err)?;
        }
        Ok(())
    }
}

fn sqlx_err(source: sqlx::Error) -> PersistenceError {
    PersistenceError::Sqlite {
        reason: source.to_string(),
        source: Some(source),
    }
}

fn encode_segment(segment: &str) -> String {
    segment.bytes().map(|b| format!("{b:02x}")).collect()
}

fn decode_segment(segment: &str) -> std::result::Result<String, String> {
    if segment.len() % 2 != 0 {
        return Err(format!("odd-length hex segment: {segment}"));
    }
    let bytes = (0..segment.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&segment[i..i + 2], 16).map_err(|e| e.to_string()))
        .collect::<std::result::Result<Vec<u8>, String>>()?;
    String::from_utf8(bytes).map_err(|e| e.to_string())
}

fn path_key(path: &[String]) -> String {
    path.iter().map(|s| encode_segment(s)).collect::<Vec<_>>().join(".")
}

/// A `LIKE` pattern matching every row whose path is a strict descendant of
/// `key`. The root path's key is `""`, which has no `.` to anchor on, so it
/// must match every row rather than only rows starting with a literal `.`.
fn descendant_like_pattern(key: &str) -> String {
    if key.is_empty() {
        "%".to_string()
    } else {
        format!("{key}.%")
    }
}

#[async_trait]
impl PersistenceBackend for SqliteBackend {
    async fn put_leaf(&self, path: &[String], record: LeafRecord) -> Result<()> {
        let key = path_key(path);
        sqlx::query(
            "INSERT INTO nodes (path, kind, type_tag, encoded, timestamp_ms) VALUES (?, 'leaf', ?, ?, ?)
             ON CONFLICT(path) DO UPDATE SET kind = 'leaf', type_tag = excluded.type_tag,
                encoded = excluded.encoded, timestamp_ms = excluded.timestamp_ms",
        )
        .bind(key)
        .bind(record.tag.as_str())
        .bind(record.encoded)
        .bind(record.timestamp_ms)
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;
        Ok(())
    }

    async fn put_empty_internal(&self, path: &[String], timestamp_ms: i64) -> Result<()> {
        let key = path_key(path);
        sqlx::query(
            "INSERT INTO nodes (path, kind, type_tag, encoded, timestamp_ms) VALUES (?, 'empty_internal', NULL, NULL, ?)
             ON CONFLICT(path) DO UPDATE SET kind = 'empty_internal', type_tag = NULL,
                encoded = NULL, timestamp_ms = excluded.timestamp_ms",
        )
        .bind(key)
        .bind(timestamp_ms)
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;
        Ok(())
    }

    async fn delete_subtree(&self, path: &[String]) -> Result<()> {
        let key = path_key(path);
        let like_pattern = descendant_like_pattern(&key);
        sqlx::query("DELETE FROM nodes WHERE path = ? OR path LIKE ?")
            .bind(&key)
            .bind(&like_pattern)
            .execute(&self.pool)
            .await
            .map_err(sqlx_err)?;
        Ok(())
    }

    async fn get(&self, path: &[String]) -> Result<Option<PersistedNode>> {
        let key = path_key(path);
        let row = sqlx::query("SELECT kind, type_tag, encoded, timestamp_ms FROM nodes WHERE path = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_err)?;
        row.map(|row| row_to_node(path, &row)).transpose()
    }

    async fn list_children(&self, path: &[String]) -> Result<Vec<String>> {
        let key = path_key(path);
        let like_pattern = descendant_like_pattern(&key);
        let rows = sqlx::query("SELECT path FROM nodes WHERE path = ? OR path LIKE ?")
            .bind(&key)
            .bind(&like_pattern)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_err)?;

        let prefix_with_dot = if key.is_empty() { String::new() } else { format!("{key}.") };
        let mut children = std::collections::BTreeSet::new();
        for row in rows {
            let stored_path: String = row.try_get("path").map_err(sqlx_err)?;
            if stored_path == key {
                continue;
            }
            let Some(rest) = stored_path.strip_prefix(&prefix_with_dot) else {
                continue;
            };
            let first_segment = rest.split('.').next().unwrap_or(rest);
            let decoded = decode_segment(first_segment).map_err(|reason| PersistenceError::Corrupt {
                path: stored_path.clone(),
                reason,
            })?;
            children.insert(decoded);
        }
        Ok(children.into_iter().collect())
    }

    async fn exists(&self, path: &[String]) -> Result<bool> {
        let key = path_key(path);
        let like_pattern = descendant_like_pattern(&key);
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM nodes WHERE path = ? OR path LIKE ? LIMIT 1")
            .bind(&key)
            .bind(&like_pattern)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_err)?;
        Ok(row.is_some())
    }

    async fn scan_all(&self) -> Result<Vec<(Vec<String>, PersistedNode)>> {
        let rows = sqlx::query("SELECT path, kind, type_tag, encoded, timestamp_ms FROM nodes")
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let stored_path: String = row.try_get("path").map_err(sqlx_err)?;
            let segments = if stored_path.is_empty() {
                Vec::new()
            } else {
                stored_path
                    .split('.')
                    .map(|s| decode_segment(s).map_err(|reason| PersistenceError::Corrupt {
                        path: stored_path.clone(),
                        reason,
                    }))
                    .collect::<Result<Vec<_>>>()?
            };
            let node = row_to_node(&segments, &row)?;
            out.push((segments, node));
        }
        Ok(out)
    }
}

fn row_to_node(path: &[String], row: &sqlx::sqlite::SqliteRow) -> Result<PersistedNode> {
    let kind: String = row.try_get("kind").map_err(sqlx_err)?;
    let timestamp_ms: i64 = row.try_get("timestamp_ms").map_err(sqlx_err)?;
    match kind.as_str() {
        "empty_internal" => Ok(PersistedNode::EmptyInternal { timestamp_ms }),
        "leaf" => {
            let tag_str: String = row.try_get("type_tag").map_err(sqlx_err)?;
            let encoded: String = row.try_get("encoded").map_err(sqlx_err)?;
            let tag = TypeTag::parse(&tag_str).ok_or_else(|| PersistenceError::Corrupt {
                path: path.join("/"),
                reason: format!("unknown type tag \"{tag_str}\""),
            })?;
            Ok(PersistedNode::Leaf(LeafRecord {
                tag,
                encoded,
                timestamp_ms,
            }))
        }
        other => Err(PersistenceError::Corrupt {
            path: path.join("/"),
            reason: format!("unknown row kind \"{other}\""),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(ts: i64) -> LeafRecord {
        LeafRecord {
            tag: TypeTag::Int,
            encoded: "{\"int\":1}".to_string(),
            timestamp_ms: ts,
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let backend = SqliteBackend::in_memory().await.unwrap();
        backend.put_leaf(&["a".to_string()], leaf(10)).await.unwrap();
        let node = backend.get(&["a".to_string()]).await.unwrap().unwrap();
        assert_eq!(node, PersistedNode::Leaf(leaf(10)));
    }

    #[tokio::test]
    async fn delete_subtree_removes_descendants() {
        let backend = SqliteBackend::in_memory().await.unwrap();
        backend
            .put_leaf(&["a".to_string(), "b".to_string()], leaf(1))
            .await
            .unwrap();
        backend.put_leaf(&["x".to_string()], leaf(1)).await.unwrap();
        backend.delete_subtree(&["a".to_string()]).await.unwrap();
        assert!(!backend.exists(&["a".to_string()]).await.unwrap());
        assert!(backend.exists(&["x".to_string()]).await.unwrap());
    }

    #[tokio::test]
    async fn list_children_decodes_segments_with_special_characters() {
        let backend = SqliteBackend::in_memory().await.unwrap();
        backend
            .put_leaf(&["a.b".to_string(), "c".to_string()], leaf(1))
            .await
            .unwrap();
        let children = backend.list_children(&["a.b".to_string()]).await.unwrap();
        assert_eq!(children, vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn delete_subtree_at_root_removes_every_row() {
        let backend = SqliteBackend::in_memory().await.unwrap();
        backend.put_leaf(&["foo".to_string()], leaf(1)).await.unwrap();
        backend
            .put_leaf(&["bar".to_string(), "baz".to_string()], leaf(1))
            .await
            .unwrap();
        backend.delete_subtree(&[]).await.unwrap();
        assert!(!backend.exists(&["foo".to_string()]).await.unwrap());
        assert!(!backend.exists(&["bar".to_string()]).await.unwrap());
        assert!(backend.scan_all().await.unwrap().is_empty());
    }
}
