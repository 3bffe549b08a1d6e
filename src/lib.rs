//! # Room Mirror
//!
//! Incremental list reconciliation for a chat client. An upstream sync
//! service describes changes to remote lists as batches of positional diffs;
//! this crate keeps local mirrors of those lists and exposes them to a
//! rendering layer as immutable, observable snapshots.
//!
//! ## Core Concepts
//!
//! - **Diffs**: [`VectorDiff`] operations applied as one atomic batch
//! - **Observables**: Copy-on-write snapshots plus change listeners
//! - **Timeline**: One room's events and virtual markers, with continuation flags
//! - **Room list**: Filtered, paginated rooms with lazily loaded summaries
//! - **Session**: Hands out the stores once a client is logged in
//!
//! ## Example
//!
//! ```ignore
//! use room_mirror::{ObservableStore, SessionConfig, SessionStore};
//!
//! let session = SessionStore::new(SessionConfig::default());
//! session.attach(client);
//!
//! let rooms = session.room_list_store().await?;
//! rooms.subscribe(|| println!("room list changed"));
//! rooms.run().await?;
//!
//! let timeline = session.timeline_store(&room_id).await?.unwrap();
//! timeline.run().await?;
//! timeline.send_message("hello").await?;
//! ```

pub mod debounce;
pub mod diff;
pub mod error;
pub mod observable;
pub mod room_list;
pub mod session;
pub mod timeline;
pub mod types;
pub mod upstream;

// Re-exports
pub use debounce::Debouncer;
pub use diff::{apply_diff, apply_diff_async, apply_diff_with_replace, VectorDiff};
pub use error::{Error, Result};
pub use observable::{
    DropReason, ListenerId, Observable, ObservableStore, StoreEvent, WatchConfig, WatchHandle,
    WatchId,
};
pub use room_list::{
    FilterKind, FilterTag, RoomListConfig, RoomListEntry, RoomListItem, RoomListReconciler,
    RoomListViewState, RoomSummary,
};
pub use session::{ClientState, SessionConfig, SessionStore};
pub use timeline::{
    InternalId, TimelineConfig, TimelineItem, TimelineItemContent, TimelineItemKind,
    TimelineReconciler, TimelineViewState, VirtualTimelineItem,
};
pub use types::{EventId, RoomId, Timestamp, TransactionId, UserId, VisibleRange};
