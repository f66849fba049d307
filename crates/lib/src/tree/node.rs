//! The in-memory tree node representation.
//!
//! The root is always an internal node: every write targets a path of
//! depth at least one (enforced by the request handlers), so the root
//! itself never transitions into a leaf.

use std::collections::BTreeMap;

use crate::value::Value;

#[derive(Debug, Clone)]
pub enum Node {
    Leaf { value: Value, timestamp_ms: i64 },
    Internal { children: BTreeMap<String, Node> },
}

impl Node {
    pub fn empty_internal() -> Self {
        Node::Internal {
            children: BTreeMap::new(),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Node::Leaf { value, .. } => value.clone(),
            Node::Internal { children } => {
                Value::Map(children.iter().map(|(k, v)| (k.clone(), v.to_value())).collect())
            }
        }
    }
}

/// Outcome of walking the tree toward a path without mutating it.
pub enum Lookup<'a> {
    /// Every segment resolved; `0` is the node living exactly at the path.
    Found(&'a Node),
    /// Some prefix of the path does not exist, and no ancestor is a leaf.
    Absent,
    /// An ancestor strictly before the end of the path is a leaf, so the
    /// path can never be created without first deleting that ancestor.
    BlockedByLeaf,
}

/// Walk `root` along `segments`, without creating or modifying anything.
pub fn lookup<'a>(root: &'a Node, segments: &[String]) -> Lookup<'a> {
    let mut current = root;
    for segment in segments {
        match current {
            Node::Leaf { .. } => return Lookup::BlockedByLeaf,
            Node::Internal { children } => match children.get(segment) {
                Some(next) => current = next,
                None => return Lookup::Absent,
            },
        }
    }
    Lookup::Found(current)
}

/// Walk `root` along the ancestors of `segments` (all but the last
/// segment), creating internal nodes for any missing ancestor. The caller
/// must already have confirmed (via [`lookup`]) that no ancestor is a
/// leaf; this function panics if that invariant was violated.
pub fn navigate_create_ancestors<'a>(root: &'a mut Node, segments: &[String]) -> &'a mut BTreeMap<String, Node> {
    let mut current = root;
    let ancestor_count = segments.len().saturating_sub(1);
    for segment in &segments[..ancestor_count] {
        current = match current {
            Node::Internal { children } => children.entry(segment.clone()).or_insert_with(Node::empty_internal),
            Node::Leaf { .. } => panic!("navigate_create_ancestors: blocked by leaf, caller must check lookup() first"),
        };
    }
    match current {
        Node::Internal { children } => children,
        Node::Leaf { .. } => panic!("navigate_create_ancestors: blocked by leaf, caller must check lookup() first"),
    }
}

/// Walk `root` to the parent of `segments`, assuming every node along the
/// way already exists (the caller must have confirmed this via [`lookup`]).
pub fn navigate_existing_parent<'a>(root: &'a mut Node, segments: &[String]) -> &'a mut BTreeMap<String, Node> {
    let mut current = root;
    let ancestor_count = segments.len().saturating_sub(1);
    for segment in &segments[..ancestor_count] {
        current = match current {
            Node::Internal { children } => children
                .get_mut(segment)
                .expect("navigate_existing_parent: caller must confirm the path exists"),
            Node::Leaf { .. } => panic!("navigate_existing_parent: blocked by leaf"),
        };
    }
    match current {
        Node::Internal { children } => children,
        Node::Leaf { .. } => panic!("navigate_existing_parent: path resolves to a leaf, not a container"),
    }
}
