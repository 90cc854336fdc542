//! Type-safe string identifiers for event kinds and descriptors.
//!
//! Descriptors refer to one another by name (a statistic names the event
//! kind it counts, an achievement names the statistics it watches). Each
//! namespace gets its own newtype so a statistic id can never be passed
//! where a transformation id is expected.

use std::borrow::Borrow;

use serde::{Deserialize, Serialize};

/// Generates a newtype wrapper around [`String`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an identifier from any string-like value.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Return the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Return whether this is the empty ("no such thing") identifier.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// Return the inner [`String`].
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Identifier of an event kind (a named record schema).
    EventKindId
}

define_id! {
    /// Identifier of an event statistic descriptor.
    StatisticId
}

define_id! {
    /// Identifier of an event transformation descriptor.
    TransformationId
}

define_id! {
    /// Identifier of a score descriptor.
    ScoreId
}

define_id! {
    /// Identifier of an achievement (or conduct) descriptor.
    AchievementId
}

impl EventKindId {
    /// Name of the kind emitted once when a new game begins.
    pub const GAME_START: &'static str = "game_start";

    /// The well-known `game_start` kind.
    pub fn game_start() -> Self {
        Self::new(Self::GAME_START)
    }

    /// Return whether this is the `game_start` kind.
    pub fn is_game_start(&self) -> bool {
        self.0 == Self::GAME_START
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_compare_by_content() {
        assert_eq!(StatisticId::new("num_kills"), StatisticId::from("num_kills"));
        assert_ne!(StatisticId::new("num_kills"), StatisticId::new("num_moves"));
    }

    #[test]
    fn empty_id_is_detected() {
        assert!(EventKindId::new("").is_empty());
        assert!(!EventKindId::game_start().is_empty());
    }

    #[test]
    fn game_start_is_recognised() {
        assert!(EventKindId::new("game_start").is_game_start());
        assert!(!EventKindId::new("character_kills_monster").is_game_start());
    }

    #[test]
    fn id_serializes_as_plain_string() {
        let json = serde_json::to_string(&AchievementId::new("kill_zombie")).ok();
        assert_eq!(json.as_deref(), Some("\"kill_zombie\""));
    }
}
