//! In-memory persistence backend, for tests and the `--backend inmemory` CLI mode.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{LeafRecord, PersistedNode, PersistenceBackend, PersistenceError, Result};

/// Keyed by the path joined with a NUL separator, since `'\0'` cannot
/// appear in a caller-supplied path segment string.
fn key(path: &[String]) -> String {
    path.join("\u{0}")
}

fn path_from_key(key: &str) -> Vec<String> {
    if key.is_empty() {
        Vec::new()
    } else {
        key.split('\u{0}').map(str::to_string).collect()
    }
}

/// A prefix matching every key that is a strict descendant of `prefix`. The
/// root path's prefix is `""`, which every key trivially starts with, so
/// this correctly means "every row" rather than "rows starting with a
/// literal NUL" (which ordinary top-level keys never do).
fn descendant_search_prefix(prefix: &str) -> String {
    if prefix.is_empty() {
        String::new()
    } else {
        format!("{prefix}\u{0}")
    }
}

#[derive(Debug, Default)]
pub struct InMemoryBackend {
    rows: RwLock<BTreeMap<String, PersistedNode>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceBackend for InMemoryBackend {
    async fn put_leaf(&self, path: &[String], record: LeafRecord) -> Result<()> {
        let mut rows = self.rows.write().map_err(poisoned)?;
        rows.insert(key(path), PersistedNode::Leaf(record));
        Ok(())
    }

    async fn put_empty_internal(&self, path: &[String], timestamp_ms: i64) -> Result<()> {
        let mut rows = self.rows.write().map_err(poisoned)?;
        rows.insert(key(path), PersistedNode::EmptyInternal { timestamp_ms });
        Ok(())
    }

    async fn delete_subtree(&self, path: &[String]) -> Result<()> {
        let prefix = key(path);
        let search_prefix = descendant_search_prefix(&prefix);
        let mut rows = self.rows.write().map_err(poisoned)?;
        rows.retain(|k, _| !(k == &prefix || k.starts_with(&search_prefix)));
        Ok(())
    }

    async fn get(&self, path: &[String]) -> Result<Option<PersistedNode>> {
        let rows = self.rows.read().map_err(poisoned)?;
        Ok(rows.get(&key(path)).cloned())
    }

    async fn list_children(&self, path: &[String]) -> Result<Vec<String>> {
        let prefix = key(path);
        let search_prefix = descendant_search_prefix(&prefix);
        let rows = self.rows.read().map_err(poisoned)?;
        let mut children = std::collections::BTreeSet::new();
        for k in rows.keys() {
            if let Some(rest) = k.strip_prefix(&search_prefix)
                && k != &prefix
            {
                if let Some(first) = rest.split('\u{0}').next() {
                    children.insert(first.to_string());
                }
            }
        }
        Ok(children.into_iter().collect())
    }

    async fn exists(&self, path: &[String]) -> Result<bool> {
        let prefix = key(path);
        let rows = self.rows.read().map_err(poisoned)?;
        if rows.contains_key(&prefix) {
            return Ok(true);
        }
        let search_prefix = descendant_search_prefix(&prefix);
        Ok(rows.keys().any(|k| k.starts_with(&search_prefix)))
    }

    async fn scan_all(&self) -> Result<Vec<(Vec<String>, PersistedNode)>> {
        let rows = self.rows.read().map_err(poisoned)?;
        Ok(rows
            .iter()
            .map(|(k, v)| (path_from_key(k), v.clone()))
            .collect())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> PersistenceError {
    PersistenceError::Corrupt {
        path: String::new(),
        reason: "in-memory backend lock poisoned".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TypeTag;

    fn leaf(ts: i64) -> LeafRecord {
        LeafRecord {
            tag: TypeTag::Int,
            encoded: "{\"int\":1}".to_string(),
            timestamp_ms: ts,
        }
    }

    #[tokio::test]
    async fn list_children_sees_implicit_internal_nodes() {
        let backend = InMemoryBackend::new();
        backend
            .put_leaf(&["a".to_string(), "b".to_string()], leaf(1))
            .await
            .unwrap();
        let children = backend.list_children(&["a".to_string()]).await.unwrap();
        assert_eq!(children, vec!["b".to_string()]);
        assert!(backend.exists(&["a".to_string()]).await.unwrap());
        assert!(backend.get(&["a".to_string()]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_subtree_removes_descendants_only() {
        let backend = InMemoryBackend::new();
        backend
            .put_leaf(&["a".to_string(), "b".to_string()], leaf(1))
            .await
            .unwrap();
        backend.put_leaf(&["c".to_string()], leaf(1)).await.unwrap();
        backend.delete_subtree(&["a".to_string()]).await.unwrap();
        assert!(!backend.exists(&["a".to_string()]).await.unwrap());
        assert!(backend.exists(&["c".to_string()]).await.unwrap());
    }

    #[tokio::test]
    async fn delete_subtree_at_root_removes_every_row() {
        let backend = InMemoryBackend::new();
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
