//! Per-room timeline mirror.
//!
//! [`TimelineReconciler`] applies upstream diff batches to a sequence of
//! [`TimelineItem`]s, recomputes continuation flags, and publishes a
//! [`TimelineViewState`] after each batch.

mod item;
mod reconciler;

pub use item::{
    EventOrTransactionId, EventTimelineItem, InternalId, MsgLikeContent, MsgLikeKind,
    TimelineItem, TimelineItemContent, TimelineItemKind, VirtualTimelineItem,
};
pub use reconciler::{TimelineConfig, TimelineReconciler, TimelineViewState};
