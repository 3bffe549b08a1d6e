//! Timeline reconciler for one room.

use crate::diff::{apply_diff_with_replace, VectorDiff};
use crate::error::{Error, Result};
use crate::observable::{ListenerId, Observable, ObservableStore};
use crate::types::RoomId;
use crate::upstream::{
    MessageType, PaginationStatus, PaginationStatusListener, RawTimelineItem, Room, TaskHandle,
    Timeline, TimelineListener,
};
use parking_lot::{Mutex, ReentrantMutex};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use super::item::TimelineItem;

/// Timeline configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Events requested per back-pagination.
    pub back_pagination_batch: u16,

    /// Virtual index of the first item before anything is prepended. Must
    /// leave room for every older item that may be paginated in.
    pub initial_first_item_index: i64,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            back_pagination_batch: 10,
            initial_first_item_index: 10_000,
        }
    }
}

/// Published state of a timeline.
#[derive(Clone, Debug, PartialEq)]
pub struct TimelineViewState {
    pub items: Vec<Arc<TimelineItem>>,
    pub show_top_spinner: bool,
    /// Virtual index of `items[0]`. Decreases as older items are prepended,
    /// so indices of already-rendered items stay put.
    pub first_item_index: i64,
    pub at_timeline_start: bool,
}

impl TimelineViewState {
    fn initial(config: &TimelineConfig) -> Self {
        Self {
            items: Vec::new(),
            show_top_spinner: false,
            first_item_index: config.initial_first_item_index,
            at_timeline_start: false,
        }
    }
}

/// Lifecycle state guarded by one lock.
struct Inner {
    running: bool,
    /// Bumped on every stop; listeners registered under an older epoch are
    /// ignored.
    epoch: u64,
    timeline_listener: Option<Box<dyn TaskHandle>>,
    pagination_listener: Option<Box<dyn TaskHandle>>,
    pagination_status: PaginationStatus,
    fault: Option<String>,
}

/// Mirrors one room's timeline from upstream diff batches.
///
/// Items are real events or virtual markers; after every batch each event's
/// continuation flag is recomputed and `first_item_index` is shifted by the
/// change in length.
pub struct TimelineReconciler {
    room_id: RoomId,
    room: Arc<dyn Room>,
    config: TimelineConfig,
    /// Resolved on first use.
    timeline: OnceCell<Arc<dyn Timeline>>,
    state: Observable<TimelineViewState>,
    inner: Mutex<Inner>,
    /// Serializes every write to `state`. Reentrant so a listener may feed
    /// the reconciler from inside its notification.
    update_lock: ReentrantMutex<()>,
    /// Serializes run.
    lifecycle: tokio::sync::Mutex<()>,
    /// A back-pagination request is in flight.
    paginating: AtomicBool,
}

impl TimelineReconciler {
    /// Create a reconciler for `room`. Nothing is requested upstream until
    /// [`run`](Self::run).
    pub fn new(room: Arc<dyn Room>, config: TimelineConfig) -> Arc<Self> {
        let room_id = room.id();
        debug!(room_id = %room_id, "timeline reconciler created");
        Arc::new(Self {
            room_id,
            room,
            state: Observable::new(TimelineViewState::initial(&config)),
            config,
            timeline: OnceCell::new(),
            inner: Mutex::new(Inner {
                running: false,
                epoch: 0,
                timeline_listener: None,
                pagination_listener: None,
                pagination_status: PaginationStatus::Idle {
                    hit_timeline_start: false,
                },
                fault: None,
            }),
            update_lock: ReentrantMutex::new(()),
            lifecycle: tokio::sync::Mutex::new(()),
            paginating: AtomicBool::new(false),
        })
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().running
    }

    /// The protocol violation that stopped this reconciler, if any.
    pub fn fault(&self) -> Option<String> {
        self.inner.lock().fault.clone()
    }

    async fn timeline(&self) -> Result<Arc<dyn Timeline>> {
        self.timeline
            .get_or_try_init(|| self.room.timeline())
            .await
            .map(Arc::clone)
    }

    // --- Lifecycle ---

    /// Start listening to the upstream timeline. Calling it while already
    /// running is a no-op.
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        let _guard = self.lifecycle.lock().await;

        let epoch = {
            let inner = self.inner.lock();
            if let Some(fault) = &inner.fault {
                return Err(Error::Faulted(fault.clone()));
            }
            if inner.running {
                debug!(room_id = %self.room_id, "timeline already running");
                return Ok(());
            }
            inner.epoch
        };

        info!(room_id = %self.room_id, "subscribing to timeline");
        let timeline = self.timeline().await?;
        let proxy = Arc::new(TimelineProxy {
            target: Arc::downgrade(self),
            epoch,
        });

        let timeline_listener = timeline.add_listener(proxy.clone()).await?;
        let pagination_listener = match timeline.subscribe_to_back_pagination_status(proxy).await
        {
            Ok(handle) => handle,
            Err(e) => {
                timeline_listener.cancel();
                return Err(e);
            }
        };

        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            // Stopped while subscribing
            timeline_listener.cancel();
            pagination_listener.cancel();
            return Ok(());
        }
        inner.timeline_listener = Some(timeline_listener);
        inner.pagination_listener = Some(pagination_listener);
        inner.running = true;
        info!(room_id = %self.room_id, "subscribed to timeline");
        Ok(())
    }

    /// Cancel the upstream listeners. Late callbacks from them are ignored.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.epoch += 1;
        let was_running = inner.running;
        inner.running = false;
        if let Some(handle) = inner.timeline_listener.take() {
            handle.cancel();
        }
        if let Some(handle) = inner.pagination_listener.take() {
            handle.cancel();
        }
        self.paginating.store(false, Ordering::SeqCst);
        if was_running {
            info!(room_id = %self.room_id, "unsubscribed from timeline");
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.inner.lock().epoch == epoch
    }

    // --- Upstream callbacks ---

    /// Apply one diff batch and publish the result.
    ///
    /// A batch that does not apply cleanly faults the reconciler: it stops,
    /// and every later batch is rejected. Listeners run before this returns
    /// and may call back in on the same thread.
    pub fn on_update(&self, diffs: Vec<VectorDiff<RawTimelineItem>>) -> Result<()> {
        if let Some(fault) = &self.inner.lock().fault {
            return Err(Error::Faulted(fault.clone()));
        }

        let _batch = self.update_lock.lock();
        let current = self.state.snapshot();
        let ops = diffs.len();

        let applied = apply_diff_with_replace(
            &current.items,
            diffs,
            |raw| TimelineItem::parse(raw).map(Arc::new),
            |old, mut new| {
                TimelineItem::carry_identity(old, Arc::make_mut(&mut new));
                new
            },
        );

        let mut items = match applied {
            Ok(items) => items,
            Err(e) => {
                error!(room_id = %self.room_id, error = %e, "timeline diff rejected");
                self.inner.lock().fault = Some(e.to_string());
                self.stop();
                return Err(e);
            }
        };

        update_continuations(&mut items);

        let delta = items.len() as i64 - current.items.len() as i64;
        let first_item_index = current.first_item_index - delta;
        debug!(
            room_id = %self.room_id,
            ops,
            len = items.len(),
            first_item_index,
            "timeline updated"
        );

        self.state.update(|latest| TimelineViewState {
            items,
            first_item_index,
            show_top_spinner: latest.show_top_spinner,
            at_timeline_start: latest.at_timeline_start,
        });
        Ok(())
    }

    /// Track the upstream back-pagination status.
    pub fn on_pagination_status_update(&self, status: PaginationStatus) {
        let _write = self.update_lock.lock();
        self.inner.lock().pagination_status = status;
        if !status.is_paginating() {
            self.paginating.store(false, Ordering::SeqCst);
        }

        self.state.update(|current| {
            let at_timeline_start = match status {
                PaginationStatus::Idle { hit_timeline_start } => hit_timeline_start,
                PaginationStatus::Paginating => current.at_timeline_start,
            };
            TimelineViewState {
                show_top_spinner: status.is_paginating(),
                at_timeline_start,
                ..current.clone()
            }
        });
    }

    // --- Actions ---

    /// Ask upstream for older events. Returns false if a request is already
    /// in flight, in which case nothing is sent.
    ///
    /// `index_hint` is the virtual index the view reached; it is only logged.
    pub async fn back_paginate(&self, index_hint: i64) -> Result<bool> {
        if self.inner.lock().pagination_status.is_paginating() {
            debug!(room_id = %self.room_id, index_hint, "already paginating");
            return Ok(false);
        }
        if self.paginating.swap(true, Ordering::SeqCst) {
            debug!(room_id = %self.room_id, index_hint, "pagination request in flight");
            return Ok(false);
        }

        debug!(room_id = %self.room_id, index_hint, "back paginating");
        let result = match self.timeline().await {
            Ok(timeline) => {
                timeline
                    .paginate_backwards(self.config.back_pagination_batch)
                    .await
            }
            Err(e) => Err(e),
        };
        self.paginating.store(false, Ordering::SeqCst);

        match result {
            Ok(hit_start) => {
                let _write = self.update_lock.lock();
                if hit_start && !self.state.snapshot().at_timeline_start {
                    self.state.update(|current| TimelineViewState {
                        at_timeline_start: true,
                        ..current.clone()
                    });
                }
                Ok(true)
            }
            Err(e) => {
                warn!(room_id = %self.room_id, error = %e, "back pagination failed");
                let _write = self.update_lock.lock();
                self.inner.lock().pagination_status = PaginationStatus::Idle {
                    hit_timeline_start: false,
                };
                if self.state.snapshot().show_top_spinner {
                    self.state.update(|current| TimelineViewState {
                        show_top_spinner: false,
                        ..current.clone()
                    });
                }
                Err(Error::PaginationFailed(e.to_string()))
            }
        }
    }

    /// Send a plain-text message. The echo arrives through the diff stream;
    /// on failure nothing in the timeline changes and the caller can retry.
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let result = async {
            let timeline = self.timeline().await?;
            let content = timeline.create_message_content(MessageType::Text {
                body: text.to_string(),
                formatted: None,
            })?;
            debug!(room_id = %self.room_id, "sending message");
            timeline.send(content).await
        }
        .await;

        match result {
            Ok(()) => {
                debug!(room_id = %self.room_id, "message sent");
                Ok(())
            }
            Err(e) => {
                warn!(room_id = %self.room_id, error = %e, "failed to send message");
                Err(Error::SendFailed(e.to_string()))
            }
        }
    }
}

impl ObservableStore for TimelineReconciler {
    type Snapshot = TimelineViewState;

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

    fn snapshot(&self) -> Arc<TimelineViewState> {
        self.state.snapshot()
    }
}

/// Recompute every item's continuation flag. Items whose flag is unchanged
/// keep sharing their allocation with older snapshots.
fn update_continuations(items: &mut [Arc<TimelineItem>]) {
    for i in 0..items.len() {
        let continuation = i > 0 && items[i].continues(&items[i - 1]);
        if items[i].continuation() != continuation {
            Arc::make_mut(&mut items[i]).set_continuation(continuation);
        }
    }
}

/// Listener handed to the upstream. Holds the reconciler weakly and drops
/// callbacks from a previous run.
struct TimelineProxy {
    target: Weak<TimelineReconciler>,
    epoch: u64,
}

impl TimelineProxy {
    fn target(&self) -> Option<Arc<TimelineReconciler>> {
        self.target
            .upgrade()
            .filter(|target| target.is_current(self.epoch))
    }
}

impl TimelineListener for TimelineProxy {
    fn on_update(&self, diffs: Vec<VectorDiff<RawTimelineItem>>) {
        if let Some(target) = self.target() {
            // Errors are logged and fault the reconciler
            let _ = target.on_update(diffs);
        }
    }
}

impl PaginationStatusListener for TimelineProxy {
    fn on_update(&self, status: PaginationStatus) {
        if let Some(target) = self.target() {
            target.on_pagination_status_update(status);
        }
    }
}
