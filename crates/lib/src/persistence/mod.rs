//! Pluggable persistence for the tree store.
//!
//! A [`PersistenceBackend`] stores leaf values and explicit empty-internal
//! markers keyed by path. It does not store implicit internal nodes: a
//! node that exists only because it is an ancestor of some leaf is never
//! given its own row. The tree store reconstructs implicit internal-node
//! existence from path prefixes of whatever rows actually are persisted.
//!
//! Atomicity is guaranteed per call only, never across the multiple calls
//! a single recursive [`crate::tree::TreeStore::write`] of a `Map` may
//! issue — matching the in-memory tree's own per-leaf-write atomicity.

pub mod errors;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub mod memory;

pub use errors::PersistenceError;

use async_trait::async_trait;

use crate::value::TypeTag;

pub type Result<T> = std::result::Result<T, PersistenceError>;

/// A persisted leaf: its encoded value, type tag, and last-write timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafRecord {
    pub tag: TypeTag,
    pub encoded: String,
    pub timestamp_ms: i64,
}

/// A persisted row, either a leaf or an explicit empty internal marker.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistedNode {
    Leaf(LeafRecord),
    EmptyInternal { timestamp_ms: i64 },
}

#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Persist (or overwrite) a leaf value at `path`.
    async fn put_leaf(&self, path: &[String], record: LeafRecord) -> Result<()>;

    /// Persist an explicit marker that `path` is an internal node with no
    /// children, distinguishing it from a node that merely happens to have
    /// no children right now because all of them were deleted.
    async fn put_empty_internal(&self, path: &[String], timestamp_ms: i64) -> Result<()>;

    /// Delete the row at `path`, if any, and every row whose path is a
    /// descendant of it.
    async fn delete_subtree(&self, path: &[String]) -> Result<()>;

    /// Fetch the row stored exactly at `path`, not considering descendants.
    async fn get(&self, path: &[String]) -> Result<Option<PersistedNode>>;

    /// Immediate child segments of `path` that have at least one persisted
    /// row at or below them (i.e. including implicit internal children).
    async fn list_children(&self, path: &[String]) -> Result<Vec<String>>;

    /// Whether `path` (or a descendant of it) has a persisted row.
    async fn exists(&self, path: &[String]) -> Result<bool>;

    /// Every persisted row, for rebuilding the in-memory tree at startup.
    ///
    /// Not part of the handler-facing RPC surface; it exists because the
    /// tree store keeps no state between process restarts other than what
    /// the backend holds, and a full scan is the simplest faithful way to
    /// reconstruct it.
    async fn scan_all(&self) -> Result<Vec<(Vec<String>, PersistedNode)>>;
}
