//! Session bootstrap and per-session store registry.

use crate::error::{Error, Result};
use crate::observable::{ListenerId, Observable, ObservableStore};
use crate::room_list::{RoomListConfig, RoomListReconciler};
use crate::timeline::{TimelineConfig, TimelineReconciler};
use crate::types::RoomId;
use crate::upstream::Client;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Session configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Timeline reconcilers kept alive at once. Past the limit the least
    /// recently used store without listeners is stopped and dropped; stores
    /// that still have listeners are never evicted, so the cache may
    /// temporarily hold more.
    pub timeline_cache_size: usize,

    pub timeline: TimelineConfig,

    pub room_list: RoomListConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeline_cache_size: 32,
            timeline: TimelineConfig::default(),
            room_list: RoomListConfig::default(),
        }
    }
}

/// Login state of the session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClientState {
    #[default]
    Unknown,
    LoggedIn,
    LoggedOut,
}

/// Readiness gate value.
#[derive(Clone)]
enum Gate {
    Pending,
    Ready(Arc<dyn Client>),
    Closed,
}

/// Owns the client and hands out the stores built on it.
///
/// Stores are only constructed once a client is attached; callers asking
/// earlier wait on the readiness gate.
pub struct SessionStore {
    config: SessionConfig,
    state: Observable<ClientState>,
    gate: watch::Sender<Gate>,
    room_list: Mutex<Option<Arc<RoomListReconciler>>>,
    timelines: Mutex<LruCache<RoomId, Arc<TimelineReconciler>>>,
}

impl SessionStore {
    pub fn new(config: SessionConfig) -> Self {
        let capacity = NonZeroUsize::new(config.timeline_cache_size).unwrap_or(NonZeroUsize::MIN);
        let (gate, _) = watch::channel(Gate::Pending);
        Self {
            config,
            state: Observable::new(ClientState::Unknown),
            gate,
            room_list: Mutex::new(None),
            timelines: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Install the logged-in client and open the readiness gate.
    pub fn attach(&self, client: Arc<dyn Client>) {
        self.gate.send_replace(Gate::Ready(client));
        info!("session ready");
        self.state.publish(ClientState::LoggedIn);
    }

    /// Close the session: stop every store and fail pending waits.
    pub fn mark_logged_out(&self) {
        self.gate.send_replace(Gate::Closed);

        if let Some(room_list) = self.room_list.lock().take() {
            room_list.stop();
        }
        let timelines: Vec<_> = {
            let mut cache = self.timelines.lock();
            let stores = cache.iter().map(|(_, store)| Arc::clone(store)).collect();
            cache.clear();
            stores
        };
        for timeline in timelines {
            timeline.stop();
        }

        info!("session logged out");
        self.state.publish(ClientState::LoggedOut);
    }

    /// Wait until a client is attached.
    pub async fn ready(&self) -> Result<Arc<dyn Client>> {
        let mut rx = self.gate.subscribe();
        let gate = Gate::clone(
            &*rx.wait_for(|gate| !matches!(gate, Gate::Pending))
                .await
                .map_err(|_| Error::LoggedOut)?,
        );

        match gate {
            Gate::Ready(client) => Ok(client),
            Gate::Pending | Gate::Closed => Err(Error::LoggedOut),
        }
    }

    /// The session's room list.
    pub async fn room_list_store(&self) -> Result<Arc<RoomListReconciler>> {
        let client = self.ready().await?;

        let mut slot = self.room_list.lock();
        let store = slot.get_or_insert_with(|| {
            debug!("creating room list store");
            RoomListReconciler::new(client.room_list_service(), self.config.room_list.clone())
        });
        Ok(Arc::clone(store))
    }

    /// The timeline of `room_id`, or `None` when no room is selected.
    pub async fn timeline_store(&self, room_id: &RoomId) -> Result<Option<Arc<TimelineReconciler>>> {
        if room_id.is_empty() {
            return Ok(None);
        }
        let client = self.ready().await?;

        if let Some(store) = self.timelines.lock().get(room_id) {
            return Ok(Some(Arc::clone(store)));
        }

        let room = client
            .get_room(room_id)?
            .ok_or_else(|| Error::RoomNotFound(room_id.clone()))?;

        let (store, evicted) = {
            let mut cache = self.timelines.lock();
            // Another caller may have created it meanwhile
            if let Some(store) = cache.get(room_id) {
                return Ok(Some(Arc::clone(store)));
            }

            // Only idle stores are evicted, least recently used first
            let limit = self.config.timeline_cache_size.max(1);
            let mut evicted = Vec::new();
            while cache.len() >= limit {
                let idle = cache
                    .iter()
                    .rev()
                    .find(|(_, store)| store.listener_count() == 0)
                    .map(|(id, _)| id.clone());
                match idle.and_then(|id| cache.pop_entry(&id)) {
                    Some(entry) => evicted.push(entry),
                    None => break,
                }
            }
            if cache.len() >= cache.cap().get() {
                let cap = cache.cap().saturating_add(1);
                debug!(cap = cap.get(), "every cached timeline is observed, growing cache");
                cache.resize(cap);
            }

            let store = TimelineReconciler::new(room, self.config.timeline.clone());
            cache.put(room_id.clone(), Arc::clone(&store));
            (store, evicted)
        };

        for (evicted_id, evicted) in evicted {
            debug!(room_id = %evicted_id, "evicting timeline store");
            evicted.stop();
        }
        Ok(Some(store))
    }

    /// Number of timeline stores currently cached.
    pub fn cached_timelines(&self) -> usize {
        self.timelines.lock().len()
    }
}

impl ObservableStore for SessionStore {
    type Snapshot = ClientState;

    fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        self.state.subscribe(listener)
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.state.unsubscribe(id);
    }

    fn listener_count(&self) -> usize {
        self.state.listener_count()
    }

    fn snapshot(&self) -> Arc<ClientState> {
        self.state.snapshot()
    }
}
