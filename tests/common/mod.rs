//! In-memory upstream used by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::future::AbortRegistration;
use parking_lot::Mutex;
use room_mirror::upstream::{
    Client, DynamicEntriesController, EntriesWithDynamicAdapters, LoadingState,
    LoadingStateListener, LoadingStateResult, MessageContent, MessageType,
    PaginationStatus, PaginationStatusListener, RawRoomEntry, RawTimelineItem, Room, RoomInfo,
    RoomList, RoomListEntriesListener, RoomListService, TaskHandle, Timeline, TimelineListener,
};
use room_mirror::{Error, FilterKind, Result, RoomId, VectorDiff};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Let spawned tasks on the current-thread runtime make progress.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

// --- Payload builders ---

pub fn message(event_id: &str, sender: &str) -> RawTimelineItem {
    RawTimelineItem(json!({
        "Event": {
            "event_id": event_id,
            "sender": sender,
            "timestamp": 1_700_000_000_000u64,
            "content": {"MsgLike": {"kind": {"Message": {"msgtype": "m.text", "body": event_id}}}}
        }
    }))
}

pub fn local_echo(transaction_id: &str, sender: &str) -> RawTimelineItem {
    RawTimelineItem(json!({
        "Event": {
            "transaction_id": transaction_id,
            "sender": sender,
            "timestamp": 1_700_000_000_000u64,
            "is_own": true,
            "content": {"MsgLike": {"kind": {"Message": {"msgtype": "m.text", "body": "pending"}}}}
        }
    }))
}

pub fn remote_echo(event_id: &str, transaction_id: &str, sender: &str) -> RawTimelineItem {
    RawTimelineItem(json!({
        "Event": {
            "event_id": event_id,
            "transaction_id": transaction_id,
            "sender": sender,
            "timestamp": 1_700_000_000_000u64,
            "is_own": true,
            "content": {"MsgLike": {"kind": {"Message": {"msgtype": "m.text", "body": "pending"}}}}
        }
    }))
}

pub fn membership(event_id: &str, sender: &str) -> RawTimelineItem {
    RawTimelineItem(json!({
        "Event": {
            "event_id": event_id,
            "sender": sender,
            "timestamp": 1_700_000_000_000u64,
            "content": {"RoomMembership": {"user_id": sender, "change": "Joined"}}
        }
    }))
}

pub fn read_marker() -> RawTimelineItem {
    RawTimelineItem(json!({"Virtual": "ReadMarker"}))
}

pub fn filled(room_id: &str) -> RawRoomEntry {
    RawRoomEntry::Filled(RoomId::from(room_id))
}

// --- Task handles ---

pub struct MockTaskHandle {
    cancelled: Arc<AtomicBool>,
}

impl MockTaskHandle {
    pub fn new() -> (Box<dyn TaskHandle>, Arc<AtomicBool>) {
        let cancelled = Arc::new(AtomicBool::new(false));
        let handle = Box::new(Self {
            cancelled: Arc::clone(&cancelled),
        });
        (handle, cancelled)
    }
}

impl TaskHandle for MockTaskHandle {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

// --- Timeline ---

#[derive(Default)]
pub struct MockTimeline {
    listener: Mutex<Option<Arc<dyn TimelineListener>>>,
    pagination_listener: Mutex<Option<Arc<dyn PaginationStatusListener>>>,
    pub handles: Mutex<Vec<Arc<AtomicBool>>>,
    pub add_listener_calls: AtomicUsize,
    pub paginate_calls: AtomicUsize,
    pub fail_paginate: AtomicBool,
    pub hit_start: AtomicBool,
    /// When set, pagination blocks until `release_pagination` is notified.
    pub hold_pagination: AtomicBool,
    pub release_pagination: Notify,
    pub fail_send: AtomicBool,
    pub sent: Mutex<Vec<MessageContent>>,
}

impl MockTimeline {
    pub fn push(&self, diffs: Vec<VectorDiff<RawTimelineItem>>) {
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener {
            listener.on_update(diffs);
        }
    }

    pub fn push_status(&self, status: PaginationStatus) {
        let listener = self.pagination_listener.lock().clone();
        if let Some(listener) = listener {
            listener.on_update(status);
        }
    }

    pub fn all_cancelled(&self) -> bool {
        let handles = self.handles.lock();
        !handles.is_empty() && handles.iter().all(|h| h.load(Ordering::SeqCst))
    }

    pub fn sent_bodies(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .map(|content| match &content.msgtype {
                MessageType::Text { body, .. }
                | MessageType::Emote { body, .. }
                | MessageType::Notice { body, .. } => body.clone(),
            })
            .collect()
    }

    fn handle(&self) -> Box<dyn TaskHandle> {
        let (handle, cancelled) = MockTaskHandle::new();
        self.handles.lock().push(cancelled);
        handle
    }
}

#[async_trait]
impl Timeline for MockTimeline {
    async fn add_listener(
        &self,
        listener: Arc<dyn TimelineListener>,
    ) -> Result<Box<dyn TaskHandle>> {
        self.add_listener_calls.fetch_add(1, Ordering::SeqCst);
        *self.listener.lock() = Some(listener);
        Ok(self.handle())
    }

    async fn subscribe_to_back_pagination_status(
        &self,
        listener: Arc<dyn PaginationStatusListener>,
    ) -> Result<Box<dyn TaskHandle>> {
        *self.pagination_listener.lock() = Some(listener);
        Ok(self.handle())
    }

    async fn paginate_backwards(&self, _num_events: u16) -> Result<bool> {
        self.paginate_calls.fetch_add(1, Ordering::SeqCst);
        if self.hold_pagination.load(Ordering::SeqCst) {
            self.release_pagination.notified().await;
        }
        if self.fail_paginate.load(Ordering::SeqCst) {
            return Err(Error::Upstream("network down".into()));
        }
        Ok(self.hit_start.load(Ordering::SeqCst))
    }

    fn create_message_content(&self, msgtype: MessageType) -> Result<MessageContent> {
        Ok(MessageContent { msgtype })
    }

    async fn send(&self, content: MessageContent) -> Result<()> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(Error::Upstream("send queue disabled".into()));
        }
        self.sent.lock().push(content);
        Ok(())
    }
}

// --- Rooms ---

pub struct MockRoom {
    pub id: RoomId,
    pub timeline: Arc<MockTimeline>,
    pub info: RoomInfo,
}

impl MockRoom {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: RoomId::from(id),
            timeline: Arc::new(MockTimeline::default()),
            info: RoomInfo {
                display_name: Some(format!("Room {}", id.trim_start_matches('!'))),
                ..Default::default()
            },
        })
    }
}

#[async_trait]
impl Room for MockRoom {
    fn id(&self) -> RoomId {
        self.id.clone()
    }

    async fn timeline(&self) -> Result<Arc<dyn Timeline>> {
        Ok(self.timeline.clone() as Arc<dyn Timeline>)
    }

    async fn room_info(&self) -> Result<RoomInfo> {
        Ok(self.info.clone())
    }
}

// --- Room list ---

#[derive(Default)]
pub struct MockController {
    pub filters: Mutex<Vec<FilterKind>>,
    pub pages: AtomicUsize,
}

impl DynamicEntriesController for MockController {
    fn set_filter(&self, kind: FilterKind) -> bool {
        let mut filters = self.filters.lock();
        let changed = filters.last() != Some(&kind);
        filters.push(kind);
        changed
    }

    fn add_one_page(&self) {
        self.pages.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MockRoomList {
    pub controller: Arc<MockController>,
    entries_listener: Mutex<Option<Arc<dyn RoomListEntriesListener>>>,
    loading_listener: Mutex<Option<Arc<dyn LoadingStateListener>>>,
    pub handles: Mutex<Vec<Arc<AtomicBool>>>,
    pub page_sizes: Mutex<Vec<u32>>,
}

impl MockRoomList {
    pub async fn push(&self, diffs: Vec<VectorDiff<RawRoomEntry>>) {
        let listener = self.entries_listener.lock().clone();
        if let Some(listener) = listener {
            listener.on_update(diffs).await;
        }
    }

    pub fn push_loading(&self, state: LoadingState) {
        let listener = self.loading_listener.lock().clone();
        if let Some(listener) = listener {
            listener.on_update(state);
        }
    }

    pub fn cancelled_count(&self) -> usize {
        self.handles
            .lock()
            .iter()
            .filter(|h| h.load(Ordering::SeqCst))
            .count()
    }

    fn handle(&self) -> Box<dyn TaskHandle> {
        let (handle, cancelled) = MockTaskHandle::new();
        self.handles.lock().push(cancelled);
        handle
    }
}

impl RoomList for MockRoomList {
    fn loading_state(
        &self,
        listener: Arc<dyn LoadingStateListener>,
    ) -> Result<LoadingStateResult> {
        *self.loading_listener.lock() = Some(listener);
        Ok(LoadingStateResult {
            state: LoadingState::NotLoaded,
            state_stream: self.handle(),
        })
    }

    fn entries_with_dynamic_adapters(
        &self,
        page_size: u32,
        listener: Arc<dyn RoomListEntriesListener>,
    ) -> EntriesWithDynamicAdapters {
        self.page_sizes.lock().push(page_size);
        *self.entries_listener.lock() = Some(listener);
        EntriesWithDynamicAdapters {
            controller: self.controller.clone() as Arc<dyn DynamicEntriesController>,
            entries_stream: self.handle(),
        }
    }
}

#[derive(Default)]
pub struct MockRoomListService {
    pub list: Arc<MockRoomList>,
    pub rooms: Mutex<HashMap<RoomId, Arc<MockRoom>>>,
    pub all_rooms_calls: AtomicUsize,
    pub subscriptions: Mutex<Vec<Vec<RoomId>>>,
    /// When set, room lookups block until `release_rooms` is notified.
    pub hold_rooms: AtomicBool,
    pub release_rooms: Notify,
}

impl MockRoomListService {
    pub fn with_rooms(ids: &[&str]) -> Arc<Self> {
        let service = Self::default();
        {
            let mut rooms = service.rooms.lock();
            for id in ids {
                rooms.insert(RoomId::from(*id), MockRoom::new(id));
            }
        }
        Arc::new(service)
    }
}

#[async_trait]
impl RoomListService for MockRoomListService {
    async fn all_rooms(&self, _abort: AbortRegistration) -> Result<Arc<dyn RoomList>> {
        self.all_rooms_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.list.clone() as Arc<dyn RoomList>)
    }

    async fn room(&self, room_id: &RoomId) -> Result<Arc<dyn Room>> {
        if self.hold_rooms.load(Ordering::SeqCst) {
            self.release_rooms.notified().await;
        }
        let room = self.rooms.lock().get(room_id).cloned();
        room.map(|room| room as Arc<dyn Room>)
            .ok_or_else(|| Error::Upstream(format!("unknown room {}", room_id)))
    }

    async fn subscribe_to_rooms(&self, room_ids: Vec<RoomId>) -> Result<()> {
        self.subscriptions.lock().push(room_ids);
        Ok(())
    }
}

// --- Client ---

pub struct MockClient {
    pub service: Arc<MockRoomListService>,
}

impl MockClient {
    pub fn new(ids: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            service: MockRoomListService::with_rooms(ids),
        })
    }

    pub fn room(&self, id: &str) -> Arc<MockRoom> {
        self.service.rooms.lock()[&RoomId::from(id)].clone()
    }
}

impl Client for MockClient {
    fn get_room(&self, room_id: &RoomId) -> Result<Option<Arc<dyn Room>>> {
        Ok(self
            .service
            .rooms
            .lock()
            .get(room_id)
            .cloned()
            .map(|room| room as Arc<dyn Room>))
    }

    fn room_list_service(&self) -> Arc<dyn RoomListService> {
        self.service.clone() as Arc<dyn RoomListService>
    }
}
