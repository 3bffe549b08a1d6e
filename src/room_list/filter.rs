//! Room-list filters.

use serde::{Deserialize, Serialize};

/// Upstream predicate narrowing the room list. Evaluated by the upstream
/// service; opaque to the reconciler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterKind {
    All { filters: Vec<FilterKind> },
    Any { filters: Vec<FilterKind> },
    NonLeft,
    Unread,
    Favourite,
    Invite,
    DeduplicateVersions,
}

/// Filter selectable from the UI.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterTag {
    /// Every room the user has not left.
    #[default]
    NonLeft,
    Unread,
    Favourite,
    Invite,
}

impl FilterTag {
    pub const ALL: [FilterTag; 4] = [
        FilterTag::NonLeft,
        FilterTag::Unread,
        FilterTag::Favourite,
        FilterTag::Invite,
    ];

    /// Display name.
    pub fn name(&self) -> &'static str {
        match self {
            FilterTag::NonLeft => "All",
            FilterTag::Unread => "Unreads",
            FilterTag::Favourite => "Favourites",
            FilterTag::Invite => "Invites",
        }
    }

    /// The upstream predicate for this tag.
    pub fn kind(&self) -> FilterKind {
        let base = match self {
            FilterTag::NonLeft => FilterKind::NonLeft,
            FilterTag::Unread => FilterKind::Unread,
            FilterTag::Favourite => FilterKind::Favourite,
            FilterTag::Invite => FilterKind::Invite,
        };
        FilterKind::All {
            filters: vec![base, FilterKind::DeduplicateVersions],
        }
    }

    /// Filter active after the user picks `requested` while `self` is
    /// active: picking the active filter again goes back to the default.
    pub fn toggled(self, requested: FilterTag) -> FilterTag {
        if self == requested {
            FilterTag::default()
        } else {
            requested
        }
    }
}
