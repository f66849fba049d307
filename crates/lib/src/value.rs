//! The tagged value union stored at tree leaves, plus path addressing.
//!
//! Mirrors the read/write surface of a configuration node: scalars, opaque
//! blobs, an opaque list, and a map that the tree store unpacks into child
//! nodes rather than storing as a single leaf.

use std::collections::BTreeMap;
use std::fmt;

/// A single path segment. Segments are opaque strings; the tree store does
/// not special-case any character (including `.`), since `Path` is always a
/// pre-split sequence rather than a dotted string to parse.
pub type Segment = String;

/// An absolute path from the root of the tree to a node, as an ordered list
/// of segments. The empty path addresses the root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Path(Vec<Segment>);

impl Path {
    pub fn root() -> Self {
        Path(Vec::new())
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Segment>,
    {
        Path(segments.into_iter().map(Into::into).collect())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if `self` is `other`, or a descendant of `other`.
    pub fn starts_with(&self, other: &Path) -> bool {
        self.0.len() >= other.0.len() && self.0[..other.0.len()] == other.0[..]
    }

    /// Every ancestor of this path, from the root down to and including
    /// `self`. Used by the subscription registry's fan-out walk.
    pub fn ancestors_inclusive(&self) -> Vec<Path> {
        (0..=self.0.len())
            .map(|n| Path(self.0[..n].to_vec()))
            .collect()
    }

    pub fn parent(&self) -> Option<Path> {
        if self.0.is_empty() {
            None
        } else {
            Some(Path(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    pub fn child(&self, segment: impl Into<Segment>) -> Path {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Path(segments)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "/")
        } else {
            for segment in &self.0 {
                write!(f, "/{segment}")?;
            }
            Ok(())
        }
    }
}

/// The tagged value a caller may read or write at a path.
///
/// `List` is opaque to the tree: it is stored and returned whole, never
/// expanded into child nodes. `Map` is the opposite: writing a `Map` walks
/// its entries and recursively merges each one into the tree as its own
/// leaf or internal node, per the write algorithm in [`crate::tree`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Null => TypeTag::Null,
            Value::Bool(_) => TypeTag::Bool,
            Value::Int(_) => TypeTag::Int,
            Value::Float(_) => TypeTag::Float,
            Value::Bytes(_) => TypeTag::Bytes,
            Value::List(_) => TypeTag::List,
            Value::Map(_) => TypeTag::Map,
        }
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Value::Map(_))
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }
}

/// The out-of-band type discriminant persisted alongside every leaf value,
/// so that decoding a stored leaf never has to guess or widen/narrow a
/// type from its encoded representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeTag {
    Null,
    Bool,
    Int,
    Float,
    Bytes,
    List,
    Map,
}

impl TypeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::Null => "null",
            TypeTag::Bool => "bool",
            TypeTag::Int => "int",
            TypeTag::Float => "float",
            TypeTag::Bytes => "bytes",
            TypeTag::List => "list",
            TypeTag::Map => "map",
        }
    }

    pub fn parse(s: &str) -> Option<TypeTag> {
        match s {
            "null" => Some(TypeTag::Null),
            "bool" => Some(TypeTag::Bool),
            "int" => Some(TypeTag::Int),
            "float" => Some(TypeTag::Float),
            "bytes" => Some(TypeTag::Bytes),
            "list" => Some(TypeTag::List),
            "map" => Some(TypeTag::Map),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ancestors_inclusive_includes_root_and_self() {
        let p = Path::from_segments(["a", "b", "c"]);
        let ancestors = p.ancestors_inclusive();
        assert_eq!(ancestors.len(), 4);
        assert_eq!(ancestors[0], Path::root());
        assert_eq!(ancestors[3], p);
    }

    #[test]
    fn starts_with_is_reflexive_and_respects_boundaries() {
        let parent = Path::from_segments(["a"]);
        let child = Path::from_segments(["a", "b"]);
        let sibling = Path::from_segments(["ab"]);
        assert!(parent.starts_with(&parent));
        assert!(child.starts_with(&parent));
        assert!(!sibling.starts_with(&parent));
        assert!(!parent.starts_with(&child));
    }
}
