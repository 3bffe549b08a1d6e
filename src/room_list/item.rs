//! Room-list entries with lazily loaded summaries.

use crate::observable::{ListenerId, Observable, ObservableStore};
use crate::types::RoomId;
use crate::upstream::{
    LatestEvent, Membership, NotificationCounts, ReadReceipts, Room, RoomInfo,
};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// State of a slot in the upstream room list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoomListEntry {
    Empty,
    Invalidated,
    Filled,
}

/// Summary of a room, loaded after the room's identity is known.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum RoomSummary {
    #[default]
    Pending,
    Loaded(RoomInfo),
    Failed(String),
}

/// One row of the room list.
///
/// The list publishes rows as soon as their identity is known; each row then
/// loads its own [`RoomSummary`] and notifies its own listeners.
pub struct RoomListItem {
    entry: RoomListEntry,
    room: Option<Arc<dyn Room>>,
    room_id: Option<RoomId>,
    summary: Observable<RoomSummary>,
    /// Set once the owning list no longer shows this row.
    released: AtomicBool,
}

impl RoomListItem {
    /// A slot with no room behind it.
    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            entry: RoomListEntry::Empty,
            room: None,
            room_id: None,
            summary: Observable::default(),
            released: AtomicBool::new(false),
        })
    }

    /// A row for `room`. Call [`load`](Self::load) to fetch its summary.
    pub fn new(entry: RoomListEntry, room: Arc<dyn Room>) -> Arc<Self> {
        let room_id = room.id();
        Arc::new(Self {
            entry,
            room: Some(room),
            room_id: Some(room_id),
            summary: Observable::default(),
            released: AtomicBool::new(false),
        })
    }

    /// Fetch the summary in the background. Must be called within a Tokio
    /// runtime. Returns `None` for empty slots.
    pub fn load(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let room = self.room.clone()?;
        let item = Arc::downgrade(self);

        Some(tokio::spawn(async move {
            let summary = match room.room_info().await {
                Ok(info) => RoomSummary::Loaded(info),
                Err(e) => {
                    warn!(room_id = %room.id(), error = %e, "failed to load room info");
                    RoomSummary::Failed(e.to_string())
                }
            };

            match item.upgrade() {
                Some(item) if !item.is_released() => item.summary.publish(summary),
                _ => debug!(room_id = %room.id(), "room info arrived after release"),
            }
        }))
    }

    /// Stop publishing summary updates.
    pub fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub fn entry(&self) -> RoomListEntry {
        self.entry
    }

    pub fn room_id(&self) -> Option<&RoomId> {
        self.room_id.as_ref()
    }

    pub fn room(&self) -> Option<&Arc<dyn Room>> {
        self.room.as_ref()
    }

    pub fn summary(&self) -> Arc<RoomSummary> {
        self.summary.snapshot()
    }

    fn with_info<T>(&self, f: impl FnOnce(&RoomInfo) -> T) -> Option<T> {
        match &*self.summary.snapshot() {
            RoomSummary::Loaded(info) => Some(f(info)),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<String> {
        self.with_info(|info| info.display_name.clone()).flatten()
    }

    pub fn avatar_url(&self) -> Option<String> {
        self.with_info(|info| info.avatar_url.clone()).flatten()
    }

    pub fn notification_counts(&self) -> Option<NotificationCounts> {
        self.with_info(|info| info.notification_counts)
    }

    pub fn read_receipts(&self) -> Option<ReadReceipts> {
        self.with_info(|info| info.read_receipts)
    }

    pub fn membership(&self) -> Option<Membership> {
        self.with_info(|info| info.membership)
    }

    pub fn has_room_call(&self) -> bool {
        self.with_info(|info| info.has_room_call).unwrap_or(false)
    }

    pub fn latest_event(&self) -> Option<LatestEvent> {
        self.with_info(|info| info.latest_event.clone()).flatten()
    }
}

impl ObservableStore for RoomListItem {
    type Snapshot = RoomSummary;

    fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        self.summary.subscribe(listener)
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.summary.unsubscribe(id);
    }

    fn listener_count(&self) -> usize {
        self.summary.listener_count()
    }

    fn snapshot(&self) -> Arc<RoomSummary> {
        self.summary.snapshot()
    }
}

impl fmt::Debug for RoomListItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomListItem")
            .field("entry", &self.entry)
            .field("room_id", &self.room_id)
            .field("summary", &self.summary.snapshot())
            .finish()
    }
}
