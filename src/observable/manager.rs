//! Snapshot holder with listener and watcher fan-out.

use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

use super::types::{
    DropReason, Listener, ListenerId, StoreEvent, WatchConfig, WatchHandle, WatchId,
};

/// Internal watcher state.
struct Watcher {
    sender: Sender<StoreEvent>,
}

impl Watcher {
    /// Try to send an event. Returns false if the buffer is full or the
    /// receiver is gone (watcher will be dropped).
    fn try_send(&self, event: StoreEvent) -> bool {
        self.sender.try_send(event).is_ok()
    }
}

/// Holds the currently published snapshot of type `S`.
///
/// The snapshot is replaced wholesale on every publish and never mutated
/// afterwards, so a reader may keep the `Arc` for as long as it likes.
pub struct Observable<S> {
    /// Currently published snapshot.
    snapshot: RwLock<Arc<S>>,
    /// Incremented once per publish.
    version: AtomicU64,
    /// Callback listeners, in subscription order.
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    /// Change-feed watchers by ID.
    watchers: RwLock<HashMap<WatchId, Watcher>>,
    /// Counter for generating listener and watcher IDs.
    next_id: AtomicU64,
}

impl<S> Observable<S> {
    /// Create an observable publishing `initial`.
    pub fn new(initial: S) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(initial)),
            version: AtomicU64::new(0),
            listeners: RwLock::new(Vec::new()),
            watchers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// The current snapshot. Returns the same `Arc` until the next publish.
    pub fn snapshot(&self) -> Arc<S> {
        Arc::clone(&self.snapshot.read())
    }

    /// Number of publishes so far.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Register a listener, called synchronously after every publish.
    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns the number of listeners left.
    pub fn unsubscribe(&self, id: ListenerId) -> usize {
        let mut listeners = self.listeners.write();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len()
    }

    /// Get listener count.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Replace the snapshot and notify everyone.
    pub fn publish(&self, state: S) {
        *self.snapshot.write() = Arc::new(state);
        self.notify();
    }

    /// Build the next snapshot from the current one and publish it.
    pub fn update(&self, f: impl FnOnce(&S) -> S) {
        {
            let mut snapshot = self.snapshot.write();
            let next = f(&snapshot);
            *snapshot = Arc::new(next);
        }
        self.notify();
    }

    // --- Change feed ---

    /// Create a change-feed watcher.
    pub fn watch(&self, config: WatchConfig) -> WatchHandle {
        let id = WatchId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size);
        self.watchers.write().insert(id, Watcher { sender });
        WatchHandle { id, receiver }
    }

    /// Stop a watcher and clean up.
    pub fn unwatch(&self, id: WatchId) {
        if let Some(watcher) = self.watchers.write().remove(&id) {
            // Best effort
            let _ = watcher.sender.try_send(StoreEvent::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    /// Get watcher count.
    pub fn watcher_count(&self) -> usize {
        self.watchers.read().len()
    }

    /// Call every listener in subscription order, then feed watchers.
    ///
    /// The listener list is copied first so a listener may subscribe or
    /// unsubscribe from inside its callback.
    fn notify(&self) {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;

        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for (position, listener) in listeners.iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| listener())).is_err() {
                error!(version, position, "store listener panicked");
            }
        }

        self.broadcast(StoreEvent::Changed { version });
    }

    /// Drops watchers that fail to receive.
    fn broadcast(&self, event: StoreEvent) {
        let mut to_remove = Vec::new();

        {
            let watchers = self.watchers.read();
            for (id, watcher) in watchers.iter() {
                if !watcher.try_send(event.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut watchers = self.watchers.write();
            for id in to_remove {
                if let Some(watcher) = watchers.remove(&id) {
                    debug!(watch_id = id.0, "dropping slow watcher");
                    let _ = watcher.sender.try_send(StoreEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }
}

impl<S: Default> Default for Observable<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}
