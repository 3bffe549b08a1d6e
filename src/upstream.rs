//! Interfaces to the upstream sync service.
//!
//! The service that computes diffs, fetches room info and sends events is
//! outside this crate. It is described here only at its boundary: the
//! control surface the reconcilers call, and the listener traits the
//! reconcilers implement so the service can push diff batches to them.

use crate::diff::VectorDiff;
use crate::error::Result;
use crate::room_list::FilterKind;
use crate::types::{RoomId, Timestamp, UserId};
use async_trait::async_trait;
use futures_util::future::AbortRegistration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A running upstream listener task.
pub trait TaskHandle: Send + Sync {
    /// Stop the task. No further callbacks are made afterwards.
    fn cancel(&self);
}

// --- Wire payloads ---

/// A timeline item exactly as the upstream sends it: a record keyed by
/// variant name (`{"Event": {..}}` or `{"Virtual": {..}}`). Parsed once, on
/// ingestion, by [`TimelineItem::parse`](crate::timeline::TimelineItem::parse).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawTimelineItem(pub serde_json::Value);

/// A room-list entry as the upstream sends it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawRoomEntry {
    /// A slot whose room is not known yet.
    Empty,
    /// A slot whose room may be stale.
    Invalidated(RoomId),
    Filled(RoomId),
}

/// Back-pagination status of a timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaginationStatus {
    Idle { hit_timeline_start: bool },
    Paginating,
}

impl PaginationStatus {
    pub fn is_paginating(&self) -> bool {
        matches!(self, PaginationStatus::Paginating)
    }
}

/// Loading state of the all-rooms list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadingState {
    NotLoaded,
    Loaded {
        maximum_number_of_rooms: Option<u32>,
    },
}

/// Rich-text body accompanying a plain-text message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FormattedBody {
    pub format: String,
    pub body: String,
}

/// Message types this client can send.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msgtype")]
pub enum MessageType {
    #[serde(rename = "m.text")]
    Text {
        body: String,
        formatted: Option<FormattedBody>,
    },
    #[serde(rename = "m.emote")]
    Emote {
        body: String,
        formatted: Option<FormattedBody>,
    },
    #[serde(rename = "m.notice")]
    Notice {
        body: String,
        formatted: Option<FormattedBody>,
    },
}

/// Event content ready to be submitted with [`Timeline::send`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageContent {
    #[serde(flatten)]
    pub msgtype: MessageType,
}

/// Membership of the current user in a room.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Membership {
    #[default]
    Joined,
    Invited,
    Knocked,
    Left,
    Banned,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationCounts {
    pub highlight_count: u64,
    pub notification_count: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceipts {
    pub num_unread: u64,
    pub num_mentions: u64,
    pub num_notifications: u64,
}

/// Preview of the most recent event in a room.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatestEvent {
    pub sender: UserId,
    pub timestamp: Timestamp,
    pub body: Option<String>,
}

/// Summary information about a room, fetched after its identity is known.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomInfo {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub membership: Membership,
    pub is_direct: bool,
    pub has_room_call: bool,
    pub notification_counts: NotificationCounts,
    pub read_receipts: ReadReceipts,
    pub latest_event: Option<LatestEvent>,
}

// --- Listeners implemented by the reconcilers ---

/// Receives timeline diff batches.
pub trait TimelineListener: Send + Sync {
    fn on_update(&self, diffs: Vec<VectorDiff<RawTimelineItem>>);
}

/// Receives back-pagination status changes.
pub trait PaginationStatusListener: Send + Sync {
    fn on_update(&self, status: PaginationStatus);
}

/// Receives room-list diff batches. Parsing room entries needs the upstream,
/// so delivery is asynchronous.
#[async_trait]
pub trait RoomListEntriesListener: Send + Sync {
    async fn on_update(&self, diffs: Vec<VectorDiff<RawRoomEntry>>);
}

/// Receives loading-state changes of the all-rooms list.
pub trait LoadingStateListener: Send + Sync {
    fn on_update(&self, state: LoadingState);
}

// --- Control surface consumed by the reconcilers ---

/// One room's live timeline.
#[async_trait]
pub trait Timeline: Send + Sync {
    async fn add_listener(&self, listener: Arc<dyn TimelineListener>)
        -> Result<Box<dyn TaskHandle>>;

    async fn subscribe_to_back_pagination_status(
        &self,
        listener: Arc<dyn PaginationStatusListener>,
    ) -> Result<Box<dyn TaskHandle>>;

    /// Request `num_events` older events. Returns true once the start of the
    /// timeline has been reached.
    async fn paginate_backwards(&self, num_events: u16) -> Result<bool>;

    fn create_message_content(&self, msgtype: MessageType) -> Result<MessageContent>;

    async fn send(&self, content: MessageContent) -> Result<()>;
}

/// A room known to the client.
#[async_trait]
pub trait Room: Send + Sync {
    fn id(&self) -> RoomId;

    async fn timeline(&self) -> Result<Arc<dyn Timeline>>;

    async fn room_info(&self) -> Result<RoomInfo>;
}

/// Result of [`RoomList::loading_state`].
pub struct LoadingStateResult {
    pub state: LoadingState,
    pub state_stream: Box<dyn TaskHandle>,
}

/// Controls the dynamic window over the all-rooms list.
pub trait DynamicEntriesController: Send + Sync {
    /// Replace the upstream predicate. Returns false if unchanged.
    fn set_filter(&self, kind: FilterKind) -> bool;

    fn add_one_page(&self);
}

/// Result of [`RoomList::entries_with_dynamic_adapters`].
pub struct EntriesWithDynamicAdapters {
    pub controller: Arc<dyn DynamicEntriesController>,
    pub entries_stream: Box<dyn TaskHandle>,
}

/// The all-rooms list adapter.
pub trait RoomList: Send + Sync {
    fn loading_state(&self, listener: Arc<dyn LoadingStateListener>)
        -> Result<LoadingStateResult>;

    fn entries_with_dynamic_adapters(
        &self,
        page_size: u32,
        listener: Arc<dyn RoomListEntriesListener>,
    ) -> EntriesWithDynamicAdapters;
}

/// Sliding-sync room list service.
#[async_trait]
pub trait RoomListService: Send + Sync {
    /// Open the all-rooms list. The request stops early if `abort` fires.
    async fn all_rooms(&self, abort: AbortRegistration) -> Result<Arc<dyn RoomList>>;

    async fn room(&self, room_id: &RoomId) -> Result<Arc<dyn Room>>;

    /// Ask for full details of these rooms to be kept up to date.
    async fn subscribe_to_rooms(&self, room_ids: Vec<RoomId>) -> Result<()>;
}

/// A logged-in client session.
pub trait Client: Send + Sync {
    fn get_room(&self, room_id: &RoomId) -> Result<Option<Arc<dyn Room>>>;

    fn room_list_service(&self) -> Arc<dyn RoomListService>;
}
