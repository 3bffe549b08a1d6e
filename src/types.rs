//! Core identifier and value types shared by the reconcilers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::time::{SystemTime, UNIX_EPOCH};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                $name(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of a room (`!abc:example.org`).
    RoomId
);
string_id!(
    /// Identifier assigned to an event by the server.
    EventId
);
string_id!(
    /// Identifier assigned locally to an event before the server echoes it.
    TransactionId
);
string_id!(
    /// Identifier of a user (`@alice:example.org`).
    UserId
);

/// Milliseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Timestamp(millis)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rows of a list currently on screen, as reported by the rendering layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct VisibleRange {
    pub start: usize,
    /// Exclusive.
    pub end: usize,
}

impl VisibleRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    pub fn as_range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Number of rows covered. An inverted range covers none.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display_and_debug() {
        let room = RoomId::new("!abc:example.org");
        assert_eq!(room.to_string(), "!abc:example.org");
        assert_eq!(format!("{:?}", room), "RoomId(!abc:example.org)");
        assert!(!room.is_empty());
        assert!(RoomId::new("").is_empty());
    }

    #[test]
    fn test_id_serde_is_transparent() {
        let id: EventId = serde_json::from_str("\"$ev1\"").unwrap();
        assert_eq!(id, EventId::from("$ev1"));
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"$ev1\"");
    }

    #[test]
    fn test_visible_range_never_inverted() {
        let range = VisibleRange::new(10, 4);
        assert!(range.is_empty());
        assert_eq!(range.as_range(), 10..10);
        assert_eq!(VisibleRange::new(2, 7).len(), 5);
    }

    #[test]
    fn test_visible_range_fields_set_inverted() {
        let range = VisibleRange { start: 8, end: 3 };
        assert_eq!(range.len(), 0);
        assert!(range.is_empty());
    }
}
