//! ggconfig: a persistent, hierarchical configuration store for a fleet of
//! cooperating components on a constrained edge device.
//!
//! Clients address configuration entries by [`Path`], a sequence of name
//! segments, and read, write, delete, or subscribe to changes through the
//! four-method RPC surface named after Greengrass's `gg_config` service:
//! `read`, `write`, `delete`, `subscribe`. Writing a [`Value::Map`]
//! recursively merges it into the tree; conflicting writes are resolved
//! last-writer-wins by an (optional, client-supplied) timestamp.
//!
//! ## Core Concepts
//!
//! * **[`value`]** — the tagged [`Value`] union stored at leaves, and
//!   [`Path`] addressing.
//! * **[`tree`]** — [`tree::TreeStore`], the persistent hierarchical tree
//!   and its merge-with-timestamp write algorithm.
//! * **[`subscription`]** — [`subscription::SubscriptionRegistry`], the
//!   ancestor-walk fan-out index from mutated path to subscriber handle.
//! * **[`handlers`]** — argument validation for the four RPC entry
//!   points; [`ConfigStore`] drives the actual mutation once validated.
//! * **[`persistence`]** — [`persistence::PersistenceBackend`], the
//!   durable storage interface ([`persistence::sqlite::SqliteBackend`] or
//!   [`persistence::memory::InMemoryBackend`]).
//!
//! `ConfigStore` is the single entry point transports should hold: it
//! owns the tree, the subscription registry, and the persistence handle
//! behind one async mutex, matching the serial-request-loop concurrency
//! model described for the engine (one request's mutations and fan-out
//! are fully applied before the next request is admitted).

pub mod clock;
pub mod codec;
pub mod error;
pub mod handlers;
pub mod persistence;
pub mod subscription;
pub mod tree;
pub mod value;

pub use clock::{Clock, SystemClock};
pub use error::{ErrorCode, GgConfigError};
pub use subscription::{Handle, Notification};
pub use tree::TreeStore;
pub use value::{Path, Value};

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use persistence::PersistenceBackend;
use subscription::SubscriptionRegistry;

/// The name by which this service is discovered on the RPC transport.
pub const SERVICE_NAME: &str = "gg_config";

struct Inner {
    tree: TreeStore,
    subscriptions: SubscriptionRegistry,
}

/// The configuration store engine: owns the tree and subscription
/// registry, and drives both from decoded request parameters.
///
/// Cloning a `ConfigStore` is cheap (it's an `Arc` internally) and shares
/// the same underlying tree; this is the intended way to hand the engine
/// to multiple transport-layer connection tasks.
#[derive(Clone)]
pub struct ConfigStore {
    inner: Arc<Mutex<Inner>>,
    clock: Arc<dyn Clock>,
}

impl ConfigStore {
    /// Open a store backed by `persistence`, restoring the tree from
    /// whatever the backend already holds, using the real system clock
    /// for write timestamps supplied by the handler.
    pub async fn open(persistence: Arc<dyn PersistenceBackend>) -> tree::Result<Self> {
        Self::open_with_clock(persistence, Arc::new(SystemClock)).await
    }

    /// Open a store with an injected [`Clock`], for deterministic tests
    /// of the handler's "supply wall time when the client omits a
    /// timestamp" behavior.
    pub async fn open_with_clock(persistence: Arc<dyn PersistenceBackend>, clock: Arc<dyn Clock>) -> tree::Result<Self> {
        let tree = TreeStore::open(persistence).await?;
        let inner = Inner {
            tree,
            subscriptions: SubscriptionRegistry::new(),
        };
        Ok(ConfigStore {
            inner: Arc::new(Mutex::new(inner)),
            clock,
        })
    }

    /// `read`: decode the value at `path`. `NotFound` if any segment of
    /// `path` is absent.
    pub async fn read(&self, path: &Path) -> Result<Value, GgConfigError> {
        let inner = self.inner.lock().await;
        Ok(inner.tree.get(path)?)
    }

    /// `write`: merge `value` into the tree at `path`. When `timestamp_ms`
    /// is `None`, the handler supplies the current wall-clock time itself
    /// (the spec's "handlers supply the current wall clock in
    /// milliseconds when the client omits it"). Returns once every
    /// sub-write has been applied (or the first `TypeMismatch` aborts the
    /// recursive merge); notification fan-out is dispatched off this
    /// call's critical path.
    pub async fn write(&self, path: &Path, value: Value, timestamp_ms: Option<i64>) -> Result<(), GgConfigError> {
        let timestamp_ms = timestamp_ms.unwrap_or_else(|| self.clock.now_millis());
        let fanout = {
            let mut inner = self.inner.lock().await;
            let mutated = inner.tree.write(path, value, timestamp_ms).await?;
            collect_fanout(&inner.subscriptions, &mutated)
        };
        dispatch(fanout);
        Ok(())
    }

    /// `write_empty_map`: ensure an internal node (possibly empty) exists
    /// at `path`. Never produces a notification (creating an internal
    /// node is not itself a leaf mutation).
    pub async fn write_empty_map(&self, path: &Path) -> Result<(), GgConfigError> {
        let timestamp_ms = self.clock.now_millis();
        let mut inner = self.inner.lock().await;
        inner.tree.write_empty_map(path, timestamp_ms).await?;
        Ok(())
    }

    /// `delete`: remove the subtree rooted at `path`. `NotFound` if
    /// absent. Emits one notification per leaf removed.
    pub async fn delete(&self, path: &Path) -> Result<(), GgConfigError> {
        let fanout = {
            let mut inner = self.inner.lock().await;
            let removed = inner.tree.delete(path).await?;
            collect_fanout(&inner.subscriptions, &removed)
        };
        dispatch(fanout);
        Ok(())
    }

    /// `subscribe`: register `handle` on `path`, requiring it to already
    /// resolve to some node. Returns the receiving half of the handle's
    /// notification channel; the transport is responsible for pumping it
    /// onto the wire.
    pub async fn subscribe(&self, path: &Path, handle: Handle) -> Result<mpsc::Receiver<Notification>, GgConfigError> {
        let mut inner = self.inner.lock().await;
        if !inner.tree.exists(path) {
            return Err(GgConfigError::not_found(format!("{path} does not exist")));
        }
        Ok(inner.subscriptions.subscribe(path.clone(), handle))
    }

    /// Remove every subscription held by `handle`. Invoked when the
    /// transport reports that a subscriber's connection has closed.
    pub async fn unsubscribe(&self, handle: Handle) {
        let mut inner = self.inner.lock().await;
        inner.subscriptions.unsubscribe(handle);
    }

    /// Validate and execute a decoded `read` request.
    pub async fn handle_read(&self, params: &Value) -> Result<Value, GgConfigError> {
        let req = handlers::parse_read(params)?;
        self.read(&req.key_path).await
    }

    /// Validate and execute a decoded `write` request.
    pub async fn handle_write(&self, params: &Value) -> Result<(), GgConfigError> {
        let req = handlers::parse_write(params)?;
        self.write(&req.key_path, req.value, req.timestamp_ms).await
    }

    /// Validate and execute a decoded `delete` request.
    pub async fn handle_delete(&self, params: &Value) -> Result<(), GgConfigError> {
        let req = handlers::parse_delete(params)?;
        self.delete(&req.key_path).await
    }

    /// Validate and execute a decoded `subscribe` request.
    pub async fn handle_subscribe(
        &self,
        params: &Value,
        handle: Handle,
    ) -> Result<mpsc::Receiver<Notification>, GgConfigError> {
        let req = handlers::parse_subscribe(params, handle)?;
        self.subscribe(&req.key_path, req.handle).await
    }
}

fn collect_fanout(
    subscriptions: &SubscriptionRegistry,
    mutated_paths: &[Path],
) -> Vec<(Path, Vec<(Handle, mpsc::Sender<Notification>)>)> {
    mutated_paths
        .iter()
        .map(|path| (path.clone(), subscriptions.handles_for(path)))
        .collect()
}

/// Send every collected notification on its own spawned task, so a slow
/// or stalled subscriber's bounded channel never blocks the next request
/// from being admitted.
fn dispatch(fanout: Vec<(Path, Vec<(Handle, mpsc::Sender<Notification>)>)>) {
    for (path, handles) in fanout {
        for (_, sender) in handles {
            let path = path.clone();
            tokio::spawn(async move {
                let _ = sender.send(Notification { path }).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::memory::InMemoryBackend;
    use std::collections::BTreeMap;

    async fn new_store() -> ConfigStore {
        ConfigStore::open(Arc::new(InMemoryBackend::new())).await.unwrap()
    }

    fn read_params(segments: &[&str]) -> Value {
        let mut map = BTreeMap::new();
        map.insert(
            "key_path".to_string(),
            Value::List(segments.iter().map(|s| Value::Bytes(s.as_bytes().to_vec())).collect()),
        );
        Value::Map(map)
    }

    fn write_params(segments: &[&str], value: Value, timestamp: Option<i64>) -> Value {
        let mut map = BTreeMap::new();
        map.insert(
            "key_path".to_string(),
            Value::List(segments.iter().map(|s| Value::Bytes(s.as_bytes().to_vec())).collect()),
        );
        map.insert("value".to_string(), value);
        if let Some(ts) = timestamp {
            map.insert("timestamp".to_string(), Value::Int(ts));
        }
        Value::Map(map)
    }

    #[tokio::test]
    async fn handle_write_then_handle_read_round_trips() {
        let store = new_store().await;
        store
            .handle_write(&write_params(&["c13", "key"], Value::Bytes(b"value".to_vec()), Some(1)))
            .await
            .unwrap();
        let got = store.handle_read(&read_params(&["c13", "key"])).await.unwrap();
        assert_eq!(got, Value::Bytes(b"value".to_vec()));
    }

    #[tokio::test]
    async fn write_omitting_timestamp_uses_the_clock() {
        let clock = Arc::new(clock::FixedClock::new(500));
        let store = ConfigStore::open_with_clock(Arc::new(InMemoryBackend::new()), clock.clone())
            .await
            .unwrap();
        store
            .write(&Path::from_segments(["p"]), Value::Int(1), None)
            .await
            .unwrap();
        // A later write with an explicit stale timestamp should be ignored,
        // proving the first write really was recorded at the clock's time.
        store
            .write(&Path::from_segments(["p"]), Value::Int(2), Some(1))
            .await
            .unwrap();
        assert_eq!(store.read(&Path::from_segments(["p"])).await.unwrap(), Value::Int(1));
    }

    #[tokio::test]
    async fn delete_on_absent_path_is_not_found() {
        let store = new_store().await;
        let err = store.delete(&Path::from_segments(["missing"])).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn subscribe_requires_existing_path() {
        let store = new_store().await;
        let err = store
            .subscribe(&Path::from_segments(["missing"]), Handle(1))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn subscriber_is_notified_on_write_and_delete_but_not_after_unsubscribe() {
        let store = new_store().await;
        store.write_empty_map(&Path::from_segments(["c20", "foo"])).await.unwrap();

        let mut rx = store
            .subscribe(&Path::from_segments(["c20", "foo"]), Handle(1))
            .await
            .unwrap();

        store
            .write(&Path::from_segments(["c20", "foo", "key"]), Value::Int(1), Some(1))
            .await
            .unwrap();
        let note = rx.recv().await.unwrap();
        assert_eq!(note.path, Path::from_segments(["c20", "foo", "key"]));

        store.unsubscribe(Handle(1)).await;
        store
            .write(&Path::from_segments(["c20", "foo", "key"]), Value::Int(2), Some(2))
            .await
            .unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn write_empty_map_produces_no_notification() {
        let store = new_store().await;
        let mut rx = {
            store.write_empty_map(&Path::from_segments(["p"])).await.unwrap();
            store.subscribe(&Path::from_segments(["p"]), Handle(1)).await.unwrap()
        };
        store.write_empty_map(&Path::from_segments(["p", "child"])).await.unwrap();

        // No leaf mutation occurred, so nothing should arrive. Follow up
        // with a real leaf write to confirm the channel is still live and
        // simply had nothing queued.
        store
            .write(&Path::from_segments(["p", "child", "leaf"]), Value::Int(1), Some(1))
            .await
            .unwrap();
        let note = rx.recv().await.unwrap();
        assert_eq!(note.path, Path::from_segments(["p", "child", "leaf"]));
    }
}
