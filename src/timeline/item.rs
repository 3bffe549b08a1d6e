//! Timeline items: real events and virtual markers.

use crate::error::{Error, Result};
use crate::types::{EventId, Timestamp, TransactionId, UserId};
use crate::upstream::RawTimelineItem;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a real event: final once the server has echoed it, local
/// while it is still being sent.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventOrTransactionId {
    EventId(EventId),
    TransactionId(TransactionId),
}

/// Kind of a message-like event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MsgLikeKind {
    Message { msgtype: String, body: String },
    Sticker { body: String },
    Poll { question: String },
    Redacted,
    UnableToDecrypt,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MsgLikeContent {
    pub kind: MsgLikeKind,
    #[serde(default)]
    pub in_reply_to: Option<EventId>,
    #[serde(default)]
    pub edited: bool,
}

/// Content of a real event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TimelineItemContent {
    MsgLike(MsgLikeContent),
    RoomMembership {
        user_id: UserId,
        change: Option<String>,
    },
    ProfileChange {
        display_name: Option<String>,
        avatar_url: Option<String>,
    },
    State {
        event_type: String,
        state_key: String,
    },
    CallInvite,
    FailedToParseMessageLike {
        event_type: String,
        error: String,
    },
    FailedToParseState {
        event_type: String,
        state_key: String,
        error: String,
    },
}

impl TimelineItemContent {
    pub fn is_message_like(&self) -> bool {
        matches!(self, TimelineItemContent::MsgLike(_))
    }
}

/// A timeline entry that doesn't correspond to an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VirtualTimelineItem {
    /// A divider between messages of two days, keyed by a timestamp on
    /// that day.
    DateDivider(Timestamp),
    /// The user's own read marker.
    ReadMarker,
    /// The start of the room's history.
    TimelineStart,
}

/// A real event in the timeline.
#[derive(Clone, Debug, PartialEq)]
pub struct EventTimelineItem {
    pub id: EventOrTransactionId,
    /// Set for events sent from this client, pending or echoed.
    pub transaction_id: Option<TransactionId>,
    pub sender: UserId,
    pub sender_display_name: Option<String>,
    pub timestamp: Timestamp,
    pub is_own: bool,
    pub content: TimelineItemContent,
}

impl EventTimelineItem {
    /// True while the server has not echoed the event yet.
    pub fn is_local_echo(&self) -> bool {
        matches!(self.id, EventOrTransactionId::TransactionId(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TimelineItemKind {
    Event(EventTimelineItem),
    Virtual(VirtualTimelineItem),
}

/// Stable key of a timeline item, used by list virtualization.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum InternalId {
    TimelineStart,
    DateDivider(Timestamp),
    ReadMarker,
    Event(EventId),
    Transaction(TransactionId),
}

impl fmt::Display for InternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InternalId::TimelineStart => f.write_str("start"),
            InternalId::DateDivider(ts) => write!(f, "divider-{}", ts),
            InternalId::ReadMarker => f.write_str("readmarker"),
            InternalId::Event(id) => f.write_str(id.as_str()),
            InternalId::Transaction(id) => f.write_str(id.as_str()),
        }
    }
}

/// Wire shape of a timeline item.
#[derive(Deserialize)]
enum WireItem {
    Event(WireEvent),
    Virtual(VirtualTimelineItem),
}

#[derive(Deserialize)]
struct WireEvent {
    #[serde(default)]
    event_id: Option<EventId>,
    #[serde(default)]
    transaction_id: Option<TransactionId>,
    sender: UserId,
    #[serde(default)]
    sender_display_name: Option<String>,
    timestamp: Timestamp,
    #[serde(default)]
    is_own: bool,
    content: TimelineItemContent,
}

/// An item of a reconciled timeline.
#[derive(Clone, Debug, PartialEq)]
pub struct TimelineItem {
    kind: TimelineItemKind,
    internal_id: InternalId,
    continuation: bool,
}

impl TimelineItem {
    /// Decode a raw upstream item into an event or a virtual item.
    pub fn parse(raw: RawTimelineItem) -> Result<Self> {
        match serde_json::from_value::<WireItem>(raw.0)? {
            WireItem::Event(wire) => {
                let id = match (wire.event_id, &wire.transaction_id) {
                    (Some(event_id), _) => EventOrTransactionId::EventId(event_id),
                    (None, Some(txn_id)) => EventOrTransactionId::TransactionId(txn_id.clone()),
                    (None, None) => {
                        return Err(Error::Decode(
                            "event has neither an event id nor a transaction id".into(),
                        ))
                    }
                };
                Ok(Self::event(EventTimelineItem {
                    id,
                    transaction_id: wire.transaction_id,
                    sender: wire.sender,
                    sender_display_name: wire.sender_display_name,
                    timestamp: wire.timestamp,
                    is_own: wire.is_own,
                    content: wire.content,
                }))
            }
            WireItem::Virtual(item) => Ok(Self::virtual_item(item)),
        }
    }

    pub fn event(event: EventTimelineItem) -> Self {
        let internal_id = match &event.id {
            EventOrTransactionId::EventId(id) => InternalId::Event(id.clone()),
            EventOrTransactionId::TransactionId(id) => InternalId::Transaction(id.clone()),
        };
        Self {
            kind: TimelineItemKind::Event(event),
            internal_id,
            continuation: false,
        }
    }

    pub fn virtual_item(item: VirtualTimelineItem) -> Self {
        let internal_id = match item {
            VirtualTimelineItem::DateDivider(ts) => InternalId::DateDivider(ts),
            VirtualTimelineItem::ReadMarker => InternalId::ReadMarker,
            VirtualTimelineItem::TimelineStart => InternalId::TimelineStart,
        };
        Self {
            kind: TimelineItemKind::Virtual(item),
            internal_id,
            continuation: false,
        }
    }

    pub fn kind(&self) -> &TimelineItemKind {
        &self.kind
    }

    pub fn as_event(&self) -> Option<&EventTimelineItem> {
        match &self.kind {
            TimelineItemKind::Event(event) => Some(event),
            TimelineItemKind::Virtual(_) => None,
        }
    }

    pub fn as_virtual(&self) -> Option<&VirtualTimelineItem> {
        match &self.kind {
            TimelineItemKind::Virtual(item) => Some(item),
            TimelineItemKind::Event(_) => None,
        }
    }

    pub fn is_real_event(&self) -> bool {
        self.as_event().is_some()
    }

    /// Key for list virtualization. Never empty.
    pub fn internal_id(&self) -> &InternalId {
        &self.internal_id
    }

    /// Whether this event visually continues the previous one.
    pub fn continuation(&self) -> bool {
        self.continuation
    }

    pub(crate) fn set_continuation(&mut self, continuation: bool) {
        self.continuation = continuation;
    }

    /// True iff both are message-like events from the same sender.
    pub fn continues(&self, prev: &TimelineItem) -> bool {
        match (self.as_event(), prev.as_event()) {
            (Some(curr), Some(prev)) => {
                curr.content.is_message_like()
                    && prev.content.is_message_like()
                    && curr.sender == prev.sender
            }
            _ => false,
        }
    }

    /// Keep `previous`'s key when `next` replaces it in place and is the
    /// same logical event: the remote echo of a local echo (matching
    /// transaction id), or an update of the same event id.
    pub fn carry_identity(previous: &TimelineItem, next: &mut TimelineItem) {
        let (Some(old), Some(new)) = (previous.as_event(), next.as_event()) else {
            return;
        };

        let same_event = match (&old.id, &new.id) {
            (EventOrTransactionId::EventId(a), EventOrTransactionId::EventId(b)) => a == b,
            _ => false,
        };
        let same_transaction =
            old.transaction_id.is_some() && old.transaction_id == new.transaction_id;

        if same_event || same_transaction {
            next.internal_id = previous.internal_id.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawTimelineItem {
        RawTimelineItem(value)
    }

    fn message(sender: &str, event_id: &str) -> TimelineItem {
        TimelineItem::parse(raw(json!({
            "Event": {
                "event_id": event_id,
                "sender": sender,
                "timestamp": 1,
                "content": {"MsgLike": {"kind": {"Message": {"msgtype": "m.text", "body": "hi"}}}}
            }
        })))
        .unwrap()
    }

    #[test]
    fn test_parse_event() {
        let item = message("@u1:x", "$e1");
        let event = item.as_event().unwrap();
        assert_eq!(event.sender, UserId::from("@u1:x"));
        assert!(event.content.is_message_like());
        assert_eq!(item.internal_id().to_string(), "$e1");
        assert!(!item.continuation());
    }

    #[test]
    fn test_parse_virtual_items() {
        let divider = TimelineItem::parse(raw(json!({"Virtual": {"DateDivider": 86400000}}))).unwrap();
        assert_eq!(divider.internal_id().to_string(), "divider-86400000");

        let marker = TimelineItem::parse(raw(json!({"Virtual": "ReadMarker"}))).unwrap();
        assert_eq!(marker.internal_id().to_string(), "readmarker");

        let start = TimelineItem::parse(raw(json!({"Virtual": "TimelineStart"}))).unwrap();
        assert_eq!(start.internal_id().to_string(), "start");
        assert!(!start.is_real_event());
    }

    #[test]
    fn test_parse_unknown_shape_fails() {
        let result = TimelineItem::parse(raw(json!({"Mystery": {}})));
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_event_without_any_id_fails() {
        let result = TimelineItem::parse(raw(json!({
            "Event": {
                "sender": "@u1:x",
                "timestamp": 1,
                "content": "CallInvite"
            }
        })));
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_pending_event_keyed_by_transaction() {
        let item = TimelineItem::parse(raw(json!({
            "Event": {
                "transaction_id": "txn1",
                "sender": "@me:x",
                "timestamp": 1,
                "is_own": true,
                "content": {"MsgLike": {"kind": {"Message": {"msgtype": "m.text", "body": "hi"}}}}
            }
        })))
        .unwrap();
        assert!(item.as_event().unwrap().is_local_echo());
        assert_eq!(item.internal_id(), &InternalId::Transaction("txn1".into()));
    }

    #[test]
    fn test_continuation_rules() {
        let a = message("@u1:x", "$a");
        let b = message("@u1:x", "$b");
        let c = message("@u2:x", "$c");
        let marker = TimelineItem::virtual_item(VirtualTimelineItem::ReadMarker);

        assert!(b.continues(&a));
        assert!(!c.continues(&b));
        assert!(!b.continues(&marker));
        assert!(!marker.continues(&a));
    }

    #[test]
    fn test_membership_change_breaks_continuation() {
        let a = message("@u1:x", "$a");
        let join = TimelineItem::parse(raw(json!({
            "Event": {
                "event_id": "$j",
                "sender": "@u1:x",
                "timestamp": 2,
                "content": {"RoomMembership": {"user_id": "@u1:x", "change": "Joined"}}
            }
        })))
        .unwrap();
        assert!(!join.continues(&a));
    }

    #[test]
    fn test_carry_identity_on_remote_echo() {
        let pending = TimelineItem::parse(raw(json!({
            "Event": {
                "transaction_id": "txn1",
                "sender": "@me:x",
                "timestamp": 1,
                "content": {"MsgLike": {"kind": {"Message": {"msgtype": "m.text", "body": "hi"}}}}
            }
        })))
        .unwrap();
        let mut sent = TimelineItem::parse(raw(json!({
            "Event": {
                "event_id": "$final",
                "transaction_id": "txn1",
                "sender": "@me:x",
                "timestamp": 1,
                "content": {"MsgLike": {"kind": {"Message": {"msgtype": "m.text", "body": "hi"}}}}
            }
        })))
        .unwrap();

        TimelineItem::carry_identity(&pending, &mut sent);
        assert_eq!(sent.internal_id().to_string(), "txn1");
    }

    #[test]
    fn test_no_carry_between_unrelated_events() {
        let old = message("@u1:x", "$a");
        let mut new = message("@u1:x", "$b");
        TimelineItem::carry_identity(&old, &mut new);
        assert_eq!(new.internal_id().to_string(), "$b");
    }
}
