//! Room-list mirror.
//!
//! [`RoomListReconciler`] keeps the filtered, paginated list of rooms in
//! sync with the upstream all-rooms list:
//! - diff batches are applied one at a time, parsing entries concurrently
//! - each [`RoomListItem`] loads its own summary after it is published
//! - changing filter rebuilds the list from scratch
//! - rooms on screen are pushed upstream for detail updates, debounced

mod filter;
mod item;
mod reconciler;

pub use filter::{FilterKind, FilterTag};
pub use item::{RoomListEntry, RoomListItem, RoomSummary};
pub use reconciler::{RoomListConfig, RoomListReconciler, RoomListViewState};
