//! The subscription registry: maps subscribed path prefixes to subscriber
//! handles and computes fan-out on every mutation.
//!
//! The registry holds no references into the tree (see the ownership note
//! in `§3` of the design): it only ever sees [`Path`] values and opaque
//! [`Handle`] tokens, and is indifferent to whether the path it was handed
//! still resolves to anything by the time a notification is sent.

use std::collections::{BTreeMap, HashMap, HashSet};

use tokio::sync::mpsc;

use crate::value::Path;

/// The outbound queue depth for a single subscriber. Sized generously
/// since notifications carry only a path, not a value; a subscriber that
/// falls this far behind is already too slow to keep up with coalescing.
const NOTIFICATION_CHANNEL_CAPACITY: usize = 256;

/// An opaque subscriber identifier allocated by the transport. The engine
/// only ever compares handles for equality; it assigns them no meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(pub u32);

/// A single fan-out event: the absolute path that was mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub path: Path,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    /// Subscribed path -> (handle -> outbound sender).
    by_path: BTreeMap<Path, HashMap<Handle, mpsc::Sender<Notification>>>,
    /// Reverse index for O(subscriptions) unsubscribe.
    by_handle: HashMap<Handle, HashSet<Path>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `(path, handle)` and return the receiving half of its
    /// notification channel. Callers are expected to have already
    /// confirmed `path` resolves to some node; the registry itself does
    /// not consult the tree (see module docs).
    pub fn subscribe(&mut self, path: Path, handle: Handle) -> mpsc::Receiver<Notification> {
        let (tx, rx) = mpsc::channel(NOTIFICATION_CHANNEL_CAPACITY);
        self.by_path.entry(path.clone()).or_default().insert(handle, tx);
        self.by_handle.entry(handle).or_default().insert(path);
        rx
    }

    /// Remove every subscription held by `handle`. Invoked when the
    /// transport reports the handle's connection closed.
    pub fn unsubscribe(&mut self, handle: Handle) {
        let Some(paths) = self.by_handle.remove(&handle) else {
            return;
        };
        for path in paths {
            if let Some(handles) = self.by_path.get_mut(&path) {
                handles.remove(&handle);
                if handles.is_empty() {
                    self.by_path.remove(&path);
                }
            }
        }
    }

    /// Senders for every handle subscribed to `mutated_path` or any of
    /// its ancestors (including the root). Walking ancestors-inclusive
    /// means a subscriber on a parent observes changes to every
    /// descendant, as required by the fan-out rule.
    pub fn handles_for(&self, mutated_path: &Path) -> Vec<(Handle, mpsc::Sender<Notification>)> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for ancestor in mutated_path.ancestors_inclusive() {
            let Some(handles) = self.by_path.get(&ancestor) else {
                continue;
            };
            for (handle, sender) in handles {
                if seen.insert(*handle) {
                    out.push((*handle, sender.clone()));
                }
            }
        }
        out
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.by_handle.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ancestor_subscriber_sees_descendant_mutation() {
        let mut registry = SubscriptionRegistry::new();
        let parent = Path::from_segments(["c20", "foo"]);
        let child = Path::from_segments(["c20", "foo", "key"]);
        let mut parent_rx = registry.subscribe(parent.clone(), Handle(1));
        let mut child_rx = registry.subscribe(child.clone(), Handle(2));

        for (_, sender) in registry.handles_for(&child) {
            sender.send(Notification { path: child.clone() }).await.unwrap();
        }

        assert_eq!(parent_rx.recv().await.unwrap().path, child);
        assert_eq!(child_rx.recv().await.unwrap().path, child);
    }

    #[tokio::test]
    async fn sibling_subscriber_is_not_notified() {
        let mut registry = SubscriptionRegistry::new();
        let sibling = Path::from_segments(["a", "sibling"]);
        let mutated = Path::from_segments(["a", "mutated"]);
        registry.subscribe(sibling, Handle(1));

        assert!(registry.handles_for(&mutated).is_empty());
    }

    #[test]
    fn unsubscribe_removes_every_recorded_path() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(Path::from_segments(["a"]), Handle(9));
        registry.subscribe(Path::from_segments(["b"]), Handle(9));
        assert_eq!(registry.subscriber_count(), 1);

        registry.unsubscribe(Handle(9));
        assert!(registry.handles_for(&Path::from_segments(["a"])).is_empty());
        assert!(registry.handles_for(&Path::from_segments(["b"])).is_empty());
        assert_eq!(registry.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn same_handle_subscribed_twice_to_an_ancestor_chain_is_notified_once() {
        let mut registry = SubscriptionRegistry::new();
        let root = Path::from_segments(["a"]);
        let leaf = Path::from_segments(["a", "b"]);
        registry.subscribe(root, Handle(1));
        registry.subscribe(leaf.clone(), Handle(1));

        let handles = registry.handles_for(&leaf);
        assert_eq!(handles.len(), 1);
    }
}
