//! The tree store: the canonical, persistent hierarchical value tree.
//!
//! Owns every node. Callers (the request handlers) only ever see borrowed
//! views for the duration of one call; see [`crate::value`] for the types
//! exchanged at this boundary.

pub mod errors;
mod node;

pub use errors::TreeError;

use std::sync::Arc;

use crate::codec;
use crate::persistence::{LeafRecord, PersistedNode, PersistenceBackend};
use crate::value::{Path, Value};
use node::{lookup, navigate_create_ancestors, navigate_existing_parent, Lookup, Node};

pub type Result<T> = std::result::Result<T, TreeError>;

pub struct TreeStore {
    root: Node,
    persistence: Arc<dyn PersistenceBackend>,
}

impl TreeStore {
    /// Build a tree store backed by `persistence`, rebuilding the
    /// in-memory tree from whatever rows the backend already holds.
    pub async fn open(persistence: Arc<dyn PersistenceBackend>) -> Result<Self> {
        let mut root = Node::empty_internal();
        let mut rows = persistence.scan_all().await?;
        // Ancestors are created on demand regardless of order, but sorting
        // shortest-path-first keeps the rebuild order legible in traces.
        rows.sort_by_key(|(segments, _)| segments.len());

        for (segments, persisted) in rows {
            match persisted {
                PersistedNode::EmptyInternal { .. } => {
                    ensure_internal_in_memory(&mut root, &segments)?;
                }
                PersistedNode::Leaf(record) => {
                    let value = decode_leaf(&record)?;
                    insert_leaf_in_memory(&mut root, &segments, value, record.timestamp_ms)?;
                }
            }
        }

        Ok(TreeStore { root, persistence })
    }

    /// `get(path)`: decode the value at `path`, recursively expanding
    /// internal nodes into `Map`s. `NotFound` if any segment is absent.
    /// Whether `path` currently resolves to any node (leaf or internal).
    /// Used by `subscribe`, which requires the path to already exist.
    pub fn exists(&self, path: &Path) -> bool {
        matches!(lookup(&self.root, path.segments()), Lookup::Found(_))
    }

    pub fn get(&self, path: &Path) -> Result<Value> {
        match lookup(&self.root, path.segments()) {
            Lookup::Found(node) => Ok(node.to_value()),
            Lookup::Absent | Lookup::BlockedByLeaf => Err(TreeError::NotFound),
        }
    }

    /// `write(path, value, timestamp)`. Returns the absolute paths of every
    /// leaf that was effectively mutated, in the order the mutations were
    /// applied — used by the caller to drive subscription fan-out.
    pub async fn write(&mut self, path: &Path, value: Value, timestamp_ms: i64) -> Result<Vec<Path>> {
        let mut mutated = Vec::new();
        self.write_inner(path, value, timestamp_ms, &mut mutated).await?;
        Ok(mutated)
    }

    fn write_inner<'a>(
        &'a mut self,
        path: &'a Path,
        value: Value,
        timestamp_ms: i64,
        mutated: &'a mut Vec<Path>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            match value {
                Value::Map(map) if map.is_empty() => self.write_empty_map(path, timestamp_ms).await,
                Value::Map(map) => {
                    for (key, child_value) in map {
                        let child_path = path.child(key);
                        self.write_inner(&child_path, child_value, timestamp_ms, mutated).await?;
                    }
                    Ok(())
                }
                scalar => {
                    if self.write_leaf(path, scalar, timestamp_ms).await? {
                        mutated.push(path.clone());
                    }
                    Ok(())
                }
            }
        })
    }

    /// `write_empty_map(path)`: ensure an internal node (possibly empty)
    /// exists at `path`. Idempotent; never produces a notification.
    pub async fn write_empty_map(&mut self, path: &Path, timestamp_ms: i64) -> Result<()> {
        match lookup(&self.root, path.segments()) {
            Lookup::Found(Node::Leaf { .. }) => {
                return Err(TreeError::type_mismatch(format!("{path} is a leaf, cannot write an empty map there")));
            }
            Lookup::BlockedByLeaf => {
                return Err(TreeError::type_mismatch(format!(
                    "an ancestor of {path} is a leaf"
                )));
            }
            Lookup::Found(Node::Internal { .. }) | Lookup::Absent => {}
        }

        self.persistence.put_empty_internal(path.segments(), timestamp_ms).await?;
        ensure_internal_in_memory(&mut self.root, path.segments())?;
        Ok(())
    }

    async fn write_leaf(&mut self, path: &Path, value: Value, timestamp_ms: i64) -> Result<bool> {
        match lookup(&self.root, path.segments()) {
            Lookup::Found(Node::Internal { .. }) => {
                return Err(TreeError::type_mismatch(format!("{path} is an internal node")));
            }
            Lookup::BlockedByLeaf => {
                return Err(TreeError::type_mismatch(format!("an ancestor of {path} is a leaf")));
            }
            Lookup::Found(Node::Leaf { timestamp_ms: existing_ts, .. }) => {
                if timestamp_ms < *existing_ts {
                    return Ok(false);
                }
            }
            Lookup::Absent => {}
        }

        let record = LeafRecord {
            tag: value.type_tag(),
            encoded: codec::encode(&value),
            timestamp_ms,
        };
        self.persistence.put_leaf(path.segments(), record).await?;
        insert_leaf_in_memory(&mut self.root, path.segments(), value, timestamp_ms)?;
        Ok(true)
    }

    /// `delete(path)`. Returns the absolute paths of every leaf removed
    /// (in an unspecified order), for notification fan-out.
    pub async fn delete(&mut self, path: &Path) -> Result<Vec<Path>> {
        let removed_leaves = match lookup(&self.root, path.segments()) {
            Lookup::Found(node) => {
                let mut leaves = Vec::new();
                collect_leaf_paths(node, path, &mut leaves);
                leaves
            }
            Lookup::Absent | Lookup::BlockedByLeaf => return Err(TreeError::NotFound),
        };

        self.persistence.delete_subtree(path.segments()).await?;

        if path.segments().is_empty() {
            self.root = Node::empty_internal();
        } else {
            let parent = navigate_existing_parent(&mut self.root, path.segments());
            let last = path.segments().last().expect("non-root path has a last segment");
            parent.remove(last);
        }

        Ok(removed_leaves)
    }
}

fn collect_leaf_paths(node: &Node, path: &Path, out: &mut Vec<Path>) {
    match node {
        Node::Leaf { .. } => out.push(path.clone()),
        Node::Internal { children } => {
            for (segment, child) in children {
                collect_leaf_paths(child, &path.child(segment.clone()), out);
            }
        }
    }
}

fn decode_leaf(record: &LeafRecord) -> Result<Value> {
    Ok(codec::decode(&record.encoded)?)
}

/// Insert a leaf during in-memory rebuild/mutation, creating any missing
/// ancestor internal nodes. Errors if an ancestor (or the path itself) is
/// already a leaf — which would indicate a corrupt persisted tree during
/// recovery, since live writes are checked against [`lookup`] beforehand.
fn insert_leaf_in_memory(root: &mut Node, segments: &[String], value: Value, timestamp_ms: i64) -> Result<()> {
    if segments.is_empty() {
        return Err(TreeError::type_mismatch("cannot store a leaf at the root path"));
    }
    if matches!(lookup(root, segments), Lookup::BlockedByLeaf) {
        return Err(TreeError::type_mismatch("recovered tree has a leaf blocking a descendant path"));
    }
    let parent = navigate_create_ancestors(root, segments);
    let last = segments.last().expect("checked non-empty above");
    parent.insert(last.clone(), Node::Leaf { value, timestamp_ms });
    Ok(())
}

fn ensure_internal_in_memory(root: &mut Node, segments: &[String]) -> Result<()> {
    if segments.is_empty() {
        return Ok(());
    }
    match lookup(root, segments) {
        Lookup::Found(Node::Leaf { .. }) => {
            return Err(TreeError::type_mismatch("recovered tree has a leaf where an internal node marker was recorded"));
        }
        Lookup::BlockedByLeaf => {
            return Err(TreeError::type_mismatch("recovered tree has a leaf blocking a descendant path"));
        }
        Lookup::Found(Node::Internal { .. }) => return Ok(()),
        Lookup::Absent => {}
    }
    let parent = navigate_create_ancestors(root, segments);
    let last = segments.last().expect("checked non-empty above");
    parent.entry(last.clone()).or_insert_with(Node::empty_internal);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::memory::InMemoryBackend;
    use std::collections::BTreeMap;

    async fn new_store() -> TreeStore {
        TreeStore::open(Arc::new(InMemoryBackend::new())).await.unwrap()
    }

    #[tokio::test]
    async fn round_trip_scalar() {
        let mut store = new_store().await;
        let path = Path::from_segments(["a", "b"]);
        store.write(&path, Value::Int(42), 1).await.unwrap();
        assert_eq!(store.get(&path).unwrap(), Value::Int(42));
    }

    #[tokio::test]
    async fn stale_write_is_ignored() {
        let mut store = new_store().await;
        let path = Path::from_segments(["p"]);
        store.write(&path, Value::Int(1), 10).await.unwrap();
        let mutated = store.write(&path, Value::Int(2), 5).await.unwrap();
        assert!(mutated.is_empty());
        assert_eq!(store.get(&path).unwrap(), Value::Int(1));
    }

    #[tokio::test]
    async fn tie_overwrites() {
        let mut store = new_store().await;
        let path = Path::from_segments(["p"]);
        store.write(&path, Value::Int(1), 10).await.unwrap();
        store.write(&path, Value::Int(2), 10).await.unwrap();
        assert_eq!(store.get(&path).unwrap(), Value::Int(2));
    }

    #[tokio::test]
    async fn leaf_then_internal_is_type_mismatch() {
        let mut store = new_store().await;
        let path = Path::from_segments(["p"]);
        store.write(&path, Value::Int(1), 1).await.unwrap();
        let err = store
            .write(&path.child("child"), Value::Int(2), 2)
            .await
            .unwrap_err();
        assert!(err.is_type_mismatch());
        assert_eq!(store.get(&path).unwrap(), Value::Int(1));
        assert!(store.get(&path.child("child")).unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn map_merges_recursively_s1_style() {
        let mut store = new_store().await;
        let mut baz_parent = BTreeMap::new();
        baz_parent.insert(
            "baz".to_string(),
            Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]),
        );
        baz_parent.insert("qux".to_string(), Value::Int(1));
        let mut foo = BTreeMap::new();
        foo.insert("bar".to_string(), Value::Map(baz_parent));
        foo.insert("quux".to_string(), Value::Bytes(b"string".to_vec()));
        let mut top = BTreeMap::new();
        top.insert("foo".to_string(), Value::Map(foo));
        top.insert("corge".to_string(), Value::Bool(true));
        top.insert("grault".to_string(), Value::Bool(false));

        let path = Path::from_segments(["c", "foobar"]);
        store.write(&path, Value::Map(top), 1).await.unwrap();

        assert_eq!(
            store.get(&Path::from_segments(["c", "foobar", "foo", "bar", "qux"])).unwrap(),
            Value::Int(1)
        );
        assert_eq!(
            store.get(&path.child("foo").child("bar").child("baz")).unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)])
        );
        assert_eq!(store.get(&path.child("corge")).unwrap(), Value::Bool(true));
    }

    #[tokio::test]
    async fn partial_merge_respects_per_leaf_timestamps() {
        let mut store = new_store().await;
        let path = Path::from_segments(["c9", "foo", "bar"]);
        let mut first = BTreeMap::new();
        first.insert("key1".to_string(), Value::Bytes(b"value1".to_vec()));
        store.write(&path, Value::Map(first), 1_720_000_000_000).await.unwrap();

        let mut second = BTreeMap::new();
        second.insert("key2".to_string(), Value::Bytes(b"value2".to_vec()));
        store.write(&path, Value::Map(second), 1_720_000_000_002).await.unwrap();

        let mut third = BTreeMap::new();
        third.insert("key1".to_string(), Value::Bytes(b"value3".to_vec()));
        third.insert("key2".to_string(), Value::Bytes(b"value4".to_vec()));
        store.write(&path, Value::Map(third), 1_720_000_000_001).await.unwrap();

        assert_eq!(
            store.get(&path.child("key1")).unwrap(),
            Value::Bytes(b"value3".to_vec())
        );
        assert_eq!(
            store.get(&path.child("key2")).unwrap(),
            Value::Bytes(b"value2".to_vec())
        );
    }

    #[tokio::test]
    async fn delete_is_recursive_and_preserves_siblings() {
        let mut store = new_store().await;
        let base = Path::from_segments(["p"]);
        store.write(&base.child("a"), Value::Int(1), 1).await.unwrap();
        store.write(&base.child("b"), Value::Int(2), 1).await.unwrap();
        store.delete(&base.child("a")).await.unwrap();

        assert!(store.get(&base.child("a")).unwrap_err().is_not_found());
        assert_eq!(store.get(&base.child("b")).unwrap(), Value::Int(2));
        let mut expected = BTreeMap::new();
        expected.insert("b".to_string(), Value::Int(2));
        assert_eq!(store.get(&base).unwrap(), Value::Map(expected));
    }

    #[tokio::test]
    async fn empty_map_write_is_idempotent() {
        let mut store = new_store().await;
        let path = Path::from_segments(["p"]);
        store.write_empty_map(&path, 1).await.unwrap();
        store.write_empty_map(&path, 2).await.unwrap();
        assert_eq!(store.get(&path).unwrap(), Value::Map(BTreeMap::new()));
    }

    #[tokio::test]
    async fn deleting_the_root_does_not_resurrect_on_reopen() {
        let persistence = Arc::new(InMemoryBackend::new());
        let mut store = TreeStore::open(persistence.clone()).await.unwrap();
        store.write(&Path::from_segments(["foo"]), Value::Int(1), 1).await.unwrap();
        store.delete(&Path::root()).await.unwrap();
        assert_eq!(store.get(&Path::root()).unwrap(), Value::Map(BTreeMap::new()));

        let reopened = TreeStore::open(persistence).await.unwrap();
        assert_eq!(reopened.get(&Path::root()).unwrap(), Value::Map(BTreeMap::new()));
        assert!(reopened.get(&Path::from_segments(["foo"])).unwrap_err().is_not_found());
    }
}
