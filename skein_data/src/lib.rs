//! Shared data model for Skein worlds.
//!
//! A Skein world is almost entirely data: locations, items, actors, and
//! locks carry property bags and behavior-module references, and the engine
//! crate interprets them. This crate owns the model types, the persisted
//! JSON schema, and the load-time validators.

pub mod defs;
pub mod ids;
pub mod schema;
pub mod validate;
pub mod value;

pub use defs::*;
pub use ids::{ActorId, EntityRef, ItemId, LocationId, LockId, PLAYER_ID};
pub use schema::{SchemaError, parse_game_state, serialize_game_state};
pub use validate::{ValidationError, validate_game_state};
pub use value::Value;
