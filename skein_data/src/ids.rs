//! Typed identifiers used across world references.
//!
//! Ids are opaque strings supplied by world content. Each entity kind gets
//! its own newtype so a lock id can never be handed to a location lookup,
//! and [`EntityRef`] tags an id with its kind for code that must work
//! across kinds (the state accessor, behavior dispatch).

use serde::{Deserialize, Serialize};
use std::fmt;
use variantly::Variantly;

/// The one reserved actor id. Exactly one actor carries it: the player.
pub const PLAYER_ID: &str = "player";

macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }
        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

id_newtype!(
    /// Id of a [`crate::Location`].
    LocationId
);
id_newtype!(
    /// Id of an [`crate::Item`].
    ItemId
);
id_newtype!(
    /// Id of an [`crate::Actor`] (the player included).
    ActorId
);
id_newtype!(
    /// Id of a [`crate::Lock`].
    LockId
);

impl ActorId {
    /// The reserved player actor id.
    pub fn player() -> Self {
        Self(PLAYER_ID.to_string())
    }
    pub fn is_player(&self) -> bool {
        self.0 == PLAYER_ID
    }
}

/// An id tagged with the kind of entity it names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Variantly)]
pub enum EntityRef {
    Location(LocationId),
    Item(ItemId),
    Actor(ActorId),
    Lock(LockId),
}

impl EntityRef {
    /// The raw id string regardless of kind.
    pub fn id_str(&self) -> &str {
        match self {
            EntityRef::Location(id) => id.as_str(),
            EntityRef::Item(id) => id.as_str(),
            EntityRef::Actor(id) => id.as_str(),
            EntityRef::Lock(id) => id.as_str(),
        }
    }

    /// Human-readable kind label for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            EntityRef::Location(_) => "location",
            EntityRef::Item(_) => "item",
            EntityRef::Actor(_) => "actor",
            EntityRef::Lock(_) => "lock",
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id_str())
    }
}

/// Parse an `exit:<location>:<direction>` item slot, if the string is one.
///
/// Door items live in these synthetic slots rather than in a location's
/// item list; the owning exit points back at the door via `door_id`.
pub fn parse_exit_slot(raw: &str) -> Option<(LocationId, &str)> {
    let rest = raw.strip_prefix("exit:")?;
    let (loc, dir) = rest.split_once(':')?;
    if loc.is_empty() || dir.is_empty() {
        return None;
    }
    Some((LocationId::from(loc), dir))
}

/// Build the `exit:<location>:<direction>` slot string for a door item.
pub fn exit_slot(location: &LocationId, direction: &str) -> String {
    format!("exit:{location}:{direction}")
}
