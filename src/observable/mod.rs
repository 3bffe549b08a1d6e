//! Observable store contract.
//!
//! Every reconciler publishes an immutable view state through an
//! [`Observable`]:
//! - `subscribe` registers a zero-argument listener and returns a token
//! - `snapshot` returns the current view state by reference
//! - publishing replaces the view state and calls listeners in order
//!
//! A panicking listener is logged and skipped; the others still run.
//!
//! # Example
//!
//! ```
//! use room_mirror::observable::Observable;
//! use std::sync::Arc;
//!
//! let store = Observable::new(Vec::<u32>::new());
//! let id = store.subscribe(|| println!("changed"));
//!
//! let before = store.snapshot();
//! assert!(Arc::ptr_eq(&before, &store.snapshot()));
//!
//! store.publish(vec![1, 2]);
//! assert_eq!(*store.snapshot(), vec![1, 2]);
//! store.unsubscribe(id);
//! ```

mod manager;
mod types;

use std::sync::Arc;

pub use manager::Observable;
pub use types::{
    DropReason, Listener, ListenerId, StoreEvent, WatchConfig, WatchHandle, WatchId,
};

/// The seam a rendering layer hooks into: subscribe, read the snapshot,
/// unsubscribe.
pub trait ObservableStore {
    /// Immutable view state handed to readers.
    type Snapshot;

    /// Register a listener called after every state change.
    ///
    /// Listeners run synchronously on the publishing thread. A listener may
    /// read the snapshot and call back into the store; it must not block on
    /// another thread that is itself waiting to publish.
    fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId;

    /// Remove a listener. Removing the last one releases upstream resources.
    fn unsubscribe(&self, id: ListenerId);

    /// Number of registered listeners. A store with none is idle.
    fn listener_count(&self) -> usize;

    /// The currently published view state.
    fn snapshot(&self) -> Arc<Self::Snapshot>;
}
