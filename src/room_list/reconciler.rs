//! Room-list reconciler for a client session.

use crate::debounce::Debouncer;
use crate::diff::{apply_diff_async, VectorDiff};
use crate::error::{Error, Result};
use crate::observable::{ListenerId, Observable, ObservableStore};
use crate::types::{RoomId, VisibleRange};
use crate::upstream::{
    DynamicEntriesController, LoadingState, LoadingStateListener, RawRoomEntry, RoomList,
    RoomListEntriesListener, RoomListService, TaskHandle,
};
use async_trait::async_trait;
use futures_util::future::AbortHandle;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::filter::FilterTag;
use super::item::{RoomListEntry, RoomListItem};

/// Room-list configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomListConfig {
    /// Rooms per page requested from upstream.
    pub page_size: u32,

    /// Quiet period before visible-room changes are pushed upstream.
    pub visible_rooms_debounce_ms: u64,

    /// Filter active when the reconciler is created.
    pub initial_filter: FilterTag,
}

impl Default for RoomListConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            visible_rooms_debounce_ms: 250,
            initial_filter: FilterTag::default(),
        }
    }
}

/// Published state of the room list.
#[derive(Clone, Debug, Default)]
pub struct RoomListViewState {
    pub rooms: Vec<Arc<RoomListItem>>,
    /// Largest room count reported by upstream for the active filter.
    pub num_rooms: u32,
    pub filter: FilterTag,
}

/// Upstream objects that exist while the list is running.
struct Adapter {
    _list: Arc<dyn RoomList>,
    controller: Arc<dyn DynamicEntriesController>,
    entries_stream: Box<dyn TaskHandle>,
    loading_stream: Box<dyn TaskHandle>,
}

impl Adapter {
    fn cancel(&self) {
        self.entries_stream.cancel();
        self.loading_stream.cancel();
    }
}

struct Inner {
    adapter: Option<Adapter>,
    /// Abort handle of an `all_rooms` request still in flight.
    pending: Option<AbortHandle>,
    /// Bumped on every stop; batches from an older epoch are discarded.
    epoch: u64,
    filter: FilterTag,
    fault: Option<String>,
    active_room: Option<RoomId>,
    visible: VisibleRange,
    /// Last set pushed with `subscribe_to_rooms`.
    subscribed: Vec<RoomId>,
}

/// Mirrors the filtered, paginated room list from upstream diff batches.
pub struct RoomListReconciler {
    service: Arc<dyn RoomListService>,
    config: RoomListConfig,
    state: Observable<RoomListViewState>,
    inner: Mutex<Inner>,
    /// Serializes run.
    run_lock: tokio::sync::Mutex<()>,
    /// Serializes batch parsing, application and publication.
    update_lock: tokio::sync::Mutex<()>,
    visible_debounce: Debouncer,
}

impl RoomListReconciler {
    pub fn new(service: Arc<dyn RoomListService>, config: RoomListConfig) -> Arc<Self> {
        debug!("room list reconciler created");
        let filter = config.initial_filter;
        Arc::new(Self {
            service,
            state: Observable::new(RoomListViewState {
                filter,
                ..Default::default()
            }),
            inner: Mutex::new(Inner {
                adapter: None,
                pending: None,
                epoch: 0,
                filter,
                fault: None,
                active_room: None,
                visible: VisibleRange::default(),
                subscribed: Vec::new(),
            }),
            run_lock: tokio::sync::Mutex::new(()),
            update_lock: tokio::sync::Mutex::new(()),
            visible_debounce: Debouncer::new(Duration::from_millis(
                config.visible_rooms_debounce_ms,
            )),
            config,
        })
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().adapter.is_some()
    }

    pub fn active_filter(&self) -> FilterTag {
        self.inner.lock().filter
    }

    /// The protocol violation that stopped this reconciler, if any.
    pub fn fault(&self) -> Option<String> {
        self.inner.lock().fault.clone()
    }

    /// Rooms last pushed upstream for detail subscription.
    pub fn subscribed_rooms(&self) -> Vec<RoomId> {
        self.inner.lock().subscribed.clone()
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.inner.lock().epoch == epoch
    }

    // --- Lifecycle ---

    /// Open the all-rooms list with the active filter and request the first
    /// page. A no-op while the upstream adapter already exists.
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        let _guard = self.run_lock.lock().await;

        let (abort, registration) = AbortHandle::new_pair();
        let (epoch, filter) = {
            let mut inner = self.inner.lock();
            if let Some(fault) = &inner.fault {
                return Err(Error::Faulted(fault.clone()));
            }
            if inner.adapter.is_some() {
                debug!("room list already running");
                return Ok(());
            }
            inner.pending = Some(abort);
            (inner.epoch, inner.filter)
        };

        info!(filter = filter.name(), "subscribing to room list");
        let list = match self.service.all_rooms(registration).await {
            Ok(list) => list,
            Err(e) => {
                self.inner.lock().pending = None;
                warn!(error = %e, "failed to open room list");
                return Err(e);
            }
        };

        let proxy = Arc::new(RoomListProxy {
            target: Arc::downgrade(self),
            epoch,
        });
        let loading = match list.loading_state(proxy.clone()) {
            Ok(loading) => loading,
            Err(e) => {
                self.inner.lock().pending = None;
                warn!(error = %e, "failed to observe room list loading state");
                return Err(e);
            }
        };
        let entries = list.entries_with_dynamic_adapters(self.config.page_size, proxy);
        let controller = entries.controller;
        let adapter = Adapter {
            _list: list,
            controller: Arc::clone(&controller),
            entries_stream: entries.entries_stream,
            loading_stream: loading.state_stream,
        };

        {
            let mut inner = self.inner.lock();
            inner.pending = None;
            if inner.epoch != epoch {
                debug!("room list stopped while subscribing");
                adapter.cancel();
                return Ok(());
            }
            inner.adapter = Some(adapter);
        }

        controller.set_filter(filter.kind());
        controller.add_one_page();

        self.on_loading_state_update(loading.state);
        self.state.update(|current| RoomListViewState {
            filter,
            ..current.clone()
        });
        info!(filter = filter.name(), "subscribed to room list");
        Ok(())
    }

    /// Tear down the upstream adapter. Batches still being parsed are
    /// discarded when they finish.
    pub fn stop(&self) {
        let adapter = {
            let mut inner = self.inner.lock();
            inner.epoch += 1;
            if let Some(pending) = inner.pending.take() {
                pending.abort();
            }
            inner.adapter.take()
        };
        self.visible_debounce.cancel();

        if let Some(adapter) = adapter {
            adapter.cancel();
            release_all(&self.state.snapshot().rooms);
            info!("unsubscribed from room list");
        }
    }

    // --- Upstream callbacks ---

    /// Apply one diff batch and publish the result.
    ///
    /// Rows are created with their summaries pending; each row loads its own
    /// summary. Batches are applied strictly one after another. A batch
    /// overtaken by [`stop`](Self::stop) while it waits or parses is
    /// discarded.
    pub async fn on_update(&self, diffs: Vec<VectorDiff<RawRoomEntry>>) -> Result<()> {
        let epoch = self.inner.lock().epoch;
        self.apply_batch(epoch, diffs).await
    }

    /// Apply a batch delivered under `epoch`.
    pub(crate) async fn apply_batch(
        &self,
        epoch: u64,
        diffs: Vec<VectorDiff<RawRoomEntry>>,
    ) -> Result<()> {
        let _batch = self.update_lock.lock().await;
        let ops = diffs.len();

        {
            let inner = self.inner.lock();
            if let Some(fault) = &inner.fault {
                return Err(Error::Faulted(fault.clone()));
            }
            if inner.epoch != epoch {
                debug!(ops, "discarding room list batch from a stopped subscription");
                return Ok(());
            }
        }

        let current = self.state.snapshot();
        let applied =
            apply_diff_async(&current.rooms, diffs, |entry| self.parse_entry(entry)).await;

        let rooms = match applied {
            Ok(rooms) if self.is_current(epoch) => rooms,
            Ok(rooms) => {
                debug!(ops, "discarding room list batch from a stopped subscription");
                release_all(&dropped_rows(&rooms, &current.rooms));
                return Ok(());
            }
            Err(e) if !self.is_current(epoch) => {
                debug!(error = %e, "ignoring failed batch from a stopped subscription");
                return Ok(());
            }
            Err(e) => {
                error!(error = %e, "room list diff rejected");
                self.inner.lock().fault = Some(e.to_string());
                self.stop();
                return Err(e);
            }
        };

        let dropped = dropped_rows(&current.rooms, &rooms);
        debug!(ops, len = rooms.len(), dropped = dropped.len(), "room list updated");
        self.state.update(|latest| RoomListViewState {
            rooms,
            num_rooms: latest.num_rooms,
            filter: latest.filter,
        });
        release_all(&dropped);
        Ok(())
    }

    async fn parse_entry(&self, entry: RawRoomEntry) -> Result<Arc<RoomListItem>> {
        let (kind, room_id) = match entry {
            RawRoomEntry::Empty => return Ok(RoomListItem::empty()),
            RawRoomEntry::Invalidated(id) => (RoomListEntry::Invalidated, id),
            RawRoomEntry::Filled(id) => (RoomListEntry::Filled, id),
        };

        let room = self.service.room(&room_id).await?;
        let item = RoomListItem::new(kind, room);
        item.load();
        Ok(item)
    }

    /// Track the upstream room count. Publishes only when it changes.
    pub fn on_loading_state_update(&self, state: LoadingState) {
        let num_rooms = match state {
            LoadingState::Loaded {
                maximum_number_of_rooms: Some(n),
            } => n,
            _ => return,
        };

        if self.state.snapshot().num_rooms != num_rooms {
            debug!(num_rooms, "room count changed");
            self.state.update(|current| RoomListViewState {
                num_rooms,
                ..current.clone()
            });
        }
    }

    // --- Actions ---

    /// Switch filters. Picking the active filter again returns to the
    /// default. The list is rebuilt from scratch under the new filter.
    pub async fn toggle_filter(self: &Arc<Self>, tag: FilterTag) -> Result<()> {
        let filter = {
            let mut inner = self.inner.lock();
            inner.filter = inner.filter.toggled(tag);
            inner.filter
        };
        info!(filter = filter.name(), "room list filter changed");

        self.stop();
        {
            // Batches publish under this lock; one that passed its epoch
            // check before the stop lands before the reset, not after it.
            let _batch = self.update_lock.lock().await;
            release_all(&self.state.snapshot().rooms);
            self.state.publish(RoomListViewState {
                rooms: Vec::new(),
                num_rooms: 0,
                filter,
            });
        }
        self.run().await
    }

    /// Request one more page. Rows arrive through [`on_update`](Self::on_update).
    pub fn load_more(&self) {
        let controller = self
            .inner
            .lock()
            .adapter
            .as_ref()
            .map(|adapter| Arc::clone(&adapter.controller));
        match controller {
            Some(controller) => controller.add_one_page(),
            None => debug!("load_more before room list is running"),
        }
    }

    /// Mark the room the user has open. Must be called within a Tokio
    /// runtime.
    pub fn set_active_room(self: &Arc<Self>, room_id: Option<RoomId>) {
        self.inner.lock().active_room = room_id.filter(|id| !id.is_empty());
        self.schedule_room_subscription();
    }

    /// Record which rows are on screen. Must be called within a Tokio
    /// runtime.
    pub fn range_changed(self: &Arc<Self>, range: VisibleRange) {
        self.inner.lock().visible = range;
        self.schedule_room_subscription();
    }

    fn schedule_room_subscription(self: &Arc<Self>) {
        let target = Arc::downgrade(self);
        self.visible_debounce.call(move || async move {
            if let Some(target) = target.upgrade() {
                target.push_room_subscription().await;
            }
        });
    }

    /// Rooms the UI currently cares about: the active room, then every
    /// visible row.
    fn rooms_of_interest(&self) -> Vec<RoomId> {
        let (active, visible) = {
            let inner = self.inner.lock();
            (inner.active_room.clone(), inner.visible)
        };
        let snapshot = self.state.snapshot();

        let mut ids: Vec<RoomId> = active.into_iter().collect();
        let end = visible.end.min(snapshot.rooms.len());
        let start = visible.start.min(end);
        for room in &snapshot.rooms[start..end] {
            if let Some(id) = room.room_id() {
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
        }
        ids
    }

    async fn push_room_subscription(&self) {
        let ids = self.rooms_of_interest();
        let unchanged = self.inner.lock().subscribed == ids;
        if ids.is_empty() || unchanged {
            return;
        }

        debug!(count = ids.len(), "subscribing to room details");
        match self.service.subscribe_to_rooms(ids.clone()).await {
            Ok(()) => self.inner.lock().subscribed = ids,
            Err(e) => warn!(error = %e, "failed to subscribe to rooms"),
        }
    }
}

impl ObservableStore for RoomListReconciler {
    type Snapshot = RoomListViewState;

    fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        self.state.subscribe(listener)
    }

    fn unsubscribe(&self, id: ListenerId) {
        if self.state.unsubscribe(id) == 0 {
            self.stop();
        }
    }

    fn listener_count(&self) -> usize {
        self.state.listener_count()
    }

    fn snapshot(&self) -> Arc<RoomListViewState> {
        self.state.snapshot()
    }
}

fn release_all(rooms: &[Arc<RoomListItem>]) {
    for room in rooms {
        room.release();
    }
}

/// Rows of `before` that are no longer in `after`.
fn dropped_rows(
    before: &[Arc<RoomListItem>],
    after: &[Arc<RoomListItem>],
) -> Vec<Arc<RoomListItem>> {
    let kept: HashSet<*const RoomListItem> = after.iter().map(Arc::as_ptr).collect();
    before
        .iter()
        .filter(|room| !kept.contains(&Arc::as_ptr(room)))
        .cloned()
        .collect()
}

/// Listener handed to the upstream. Holds the reconciler weakly and drops
/// callbacks from a previous run.
struct RoomListProxy {
    target: Weak<RoomListReconciler>,
    epoch: u64,
}

impl RoomListProxy {
    fn target(&self) -> Option<Arc<RoomListReconciler>> {
        self.target
            .upgrade()
            .filter(|target| target.is_current(self.epoch))
    }
}

#[async_trait]
impl RoomListEntriesListener for RoomListProxy {
    async fn on_update(&self, diffs: Vec<VectorDiff<RawRoomEntry>>) {
        if let Some(target) = self.target() {
            // Errors are logged and fault the reconciler
            let _ = target.apply_batch(self.epoch, diffs).await;
        }
    }
}

impl LoadingStateListener for RoomListProxy {
    fn on_update(&self, state: LoadingState) {
        if let Some(target) = self.target() {
            target.on_loading_state_update(state);
        }
    }
}
