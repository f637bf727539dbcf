//! Persisted world schema.
//!
//! Worlds are JSON documents with top-level sections for metadata,
//! locations, items, actors, locks, and scripts, plus the cross-cutting
//! turn state. The loader also accepts two legacy shapes: a standalone
//! `doors[]` section (converted to door items in `exit:` slots) and a
//! `player`/`player_state` section (folded into the actors map), and it
//! preserves unknown top-level keys so old worlds survive a round trip.

use crate::defs::{Actor, Commitment, DoorInfo, GameState, Gossip, Item, Location, Lock, Metadata, Script};
use crate::ids::{ActorId, ItemId, LocationId, LockId, PLAYER_ID, exit_slot};
use crate::validate::{ValidationError, validate_game_state};
use crate::value::Value;

use log::warn;
use serde::Deserialize;
use serde_json::{Map as JsonMap, Value as Json};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// The persisted world violates structural expectations. Fatal at load time.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("world document must be a JSON object")]
    NotAnObject,
    #[error("missing required section: {0}")]
    MissingSection(&'static str),
    #[error("{section} must be an array")]
    NotAnArray { section: &'static str },
    #[error("{kind} entry missing required string field 'id'")]
    MissingId { kind: &'static str },
    #[error("duplicate {kind} id '{id}'")]
    DuplicateId { kind: &'static str, id: String },
    #[error("malformed {kind} '{id}': {detail}")]
    BadEntry {
        kind: &'static str,
        id: String,
        detail: String,
    },
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Any failure while loading a world from disk.
#[derive(Debug, Error)]
pub enum WorldLoadError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("cannot read world file: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level keys the loader understands; everything else is carried in
/// `extra` untouched.
const KNOWN_KEYS: &[&str] = &[
    "metadata",
    "vocabulary",
    "locations",
    "doors",
    "items",
    "locks",
    "npcs",
    "actors",
    "scripts",
    "player",
    "player_state",
    "turn",
    "gossip_queue",
    "active_commitments",
];

/// Read, parse, and validate a world file.
pub fn load_game_state(path: impl AsRef<Path>) -> Result<GameState, WorldLoadError> {
    let raw_text = std::fs::read_to_string(path)?;
    let raw: Json = serde_json::from_str(&raw_text).map_err(SchemaError::from)?;
    let state = parse_game_state(&raw)?;
    validate_game_state(&state)?;
    Ok(state)
}

/// Parse a raw JSON document into a [`GameState`].
///
/// Structure only; run [`validate_game_state`] afterwards for the
/// referential-integrity invariants.
///
/// # Errors
/// [`SchemaError`] on missing sections, non-string ids, same-kind duplicate
/// ids, or malformed entries.
pub fn parse_game_state(raw: &Json) -> Result<GameState, SchemaError> {
    let doc = raw.as_object().ok_or(SchemaError::NotAnObject)?;

    let metadata: Metadata = doc
        .get("metadata")
        .ok_or(SchemaError::MissingSection("metadata"))
        .and_then(|m| deserialize_entry(m, "metadata", "metadata"))?;

    let mut state = GameState {
        metadata,
        ..GameState::default()
    };

    for loc in entries(doc, "locations")? {
        let id = require_id(loc, "location")?;
        let location: Location = deserialize_entry(loc, "location", &id)?;
        if state.locations.insert(location.id.clone(), location).is_some() {
            return Err(SchemaError::DuplicateId { kind: "location", id });
        }
    }

    for item_raw in entries(doc, "items")? {
        let id = require_id(item_raw, "item")?;
        let item: Item = deserialize_entry(&merge_llm_context(item_raw), "item", &id)?;
        if state.items.insert(item.id.clone(), item).is_some() {
            return Err(SchemaError::DuplicateId { kind: "item", id });
        }
    }

    // legacy standalone doors become door items parked in exit slots
    for door_raw in entries(doc, "doors")? {
        let id = require_id(door_raw, "door")?;
        let item = convert_legacy_door(door_raw, &id, &state)?;
        if state.items.insert(item.id.clone(), item).is_some() {
            return Err(SchemaError::DuplicateId { kind: "door", id });
        }
    }

    for lock_raw in entries(doc, "locks")? {
        let id = require_id(lock_raw, "lock")?;
        let lock: Lock = deserialize_entry(lock_raw, "lock", &id)?;
        if state.locks.insert(lock.id.clone(), lock).is_some() {
            return Err(SchemaError::DuplicateId { kind: "lock", id });
        }
    }

    // newer worlds say "actors", older ones "npcs"; both may appear
    for section in ["actors", "npcs"] {
        for actor_raw in entries(doc, section)? {
            let id = require_id(actor_raw, "actor")?;
            let actor: Actor = deserialize_entry(&merge_llm_context(actor_raw), "actor", &id)?;
            if state.actors.insert(actor.id.clone(), actor).is_some() {
                return Err(SchemaError::DuplicateId { kind: "actor", id });
            }
        }
    }

    for script_raw in entries(doc, "scripts")? {
        let id = require_id(script_raw, "script")?;
        let script: Script = deserialize_entry(script_raw, "script", &id)?;
        state.scripts.push(script);
    }

    apply_player_section(doc, &mut state)?;

    if let Some(turn) = doc.get("turn") {
        state.turn = turn.as_u64().unwrap_or_default();
    }
    if let Some(gossip) = doc.get("gossip_queue") {
        state.gossip_queue = deserialize_entry::<Vec<Gossip>>(gossip, "gossip_queue", "gossip_queue")?;
    }
    if let Some(commitments) = doc.get("active_commitments") {
        state.commitments =
            deserialize_entry::<BTreeMap<String, Commitment>>(commitments, "active_commitments", "active_commitments")?;
    }

    // unknown keys (and the legacy vocabulary table) ride along in extra
    for (key, val) in doc {
        let keep = !KNOWN_KEYS.contains(&key.as_str()) || key == "vocabulary";
        if keep {
            state.extra.insert(key.clone(), json_to_value(val));
        }
    }

    Ok(state)
}

/// Serialize a [`GameState`] back to the document form [`parse_game_state`]
/// accepts. Parse → serialize → parse is semantically identical.
pub fn serialize_game_state(state: &GameState) -> Json {
    let mut doc = JsonMap::new();
    doc.insert("metadata".into(), to_json(&state.metadata));
    doc.insert(
        "locations".into(),
        Json::Array(state.locations.values().map(to_json).collect()),
    );
    doc.insert("items".into(), Json::Array(state.items.values().map(to_json).collect()));
    doc.insert("actors".into(), Json::Array(state.actors.values().map(to_json).collect()));
    doc.insert("locks".into(), Json::Array(state.locks.values().map(to_json).collect()));
    doc.insert("scripts".into(), Json::Array(state.scripts.iter().map(to_json).collect()));
    doc.insert("turn".into(), Json::from(state.turn));
    doc.insert("gossip_queue".into(), to_json(&state.gossip_queue));
    doc.insert("active_commitments".into(), to_json(&state.commitments));
    for (key, val) in &state.extra {
        doc.entry(key.clone()).or_insert_with(|| to_json(val));
    }
    Json::Object(doc)
}

fn to_json<T: serde::Serialize>(value: &T) -> Json {
    serde_json::to_value(value).expect("world state types serialize infallibly")
}

fn json_to_value(raw: &Json) -> Value {
    serde_json::from_value(raw.clone()).expect("every JSON value maps onto Value")
}

fn entries<'a>(doc: &'a JsonMap<String, Json>, section: &'static str) -> Result<Vec<&'a Json>, SchemaError> {
    match doc.get(section) {
        None => Ok(Vec::new()),
        Some(Json::Array(list)) => Ok(list.iter().collect()),
        Some(_) => Err(SchemaError::NotAnArray { section }),
    }
}

fn require_id(raw: &Json, kind: &'static str) -> Result<String, SchemaError> {
    raw.get("id")
        .and_then(Json::as_str)
        .map(str::to_string)
        .ok_or(SchemaError::MissingId { kind })
}

fn deserialize_entry<T: for<'de> Deserialize<'de>>(raw: &Json, kind: &'static str, id: &str) -> Result<T, SchemaError> {
    T::deserialize(raw).map_err(|err| SchemaError::BadEntry {
        kind,
        id: id.to_string(),
        detail: err.to_string(),
    })
}

/// Items and actors may declare `llm_context` inline; it belongs in the
/// property bag so narration code finds it in one place.
fn merge_llm_context(raw: &Json) -> Json {
    let Some(obj) = raw.as_object() else {
        return raw.clone();
    };
    let Some(llm_context) = obj.get("llm_context").cloned() else {
        return raw.clone();
    };
    let mut obj = obj.clone();
    obj.remove("llm_context");
    let bag_key = if obj.contains_key("properties") { "properties" } else { "states" };
    let states = obj
        .entry(bag_key)
        .or_insert_with(|| Json::Object(JsonMap::new()));
    if let Some(states_obj) = states.as_object_mut() {
        states_obj.entry("llm_context").or_insert(llm_context);
    }
    Json::Object(obj)
}

/// Convert a legacy `doors[]` entry into a door item parked in the exit
/// slot of the first exit that references it.
fn convert_legacy_door(raw: &Json, id: &str, state: &GameState) -> Result<Item, SchemaError> {
    let obj = raw.as_object().ok_or(SchemaError::BadEntry {
        kind: "door",
        id: id.to_string(),
        detail: "must be an object".into(),
    })?;

    let door_id = ItemId::from(id);
    let slot = state
        .locations
        .values()
        .find_map(|loc| {
            loc.exits
                .iter()
                .find(|(_, exit)| exit.door_id.as_ref() == Some(&door_id))
                .map(|(direction, _)| exit_slot(&loc.id, direction))
        })
        .unwrap_or_default();
    if slot.is_empty() {
        warn!("legacy door '{id}' is referenced by no exit; leaving it unplaced");
    }

    Ok(Item {
        id: door_id,
        name: obj.get("name").and_then(Json::as_str).unwrap_or("door").to_string(),
        description: obj
            .get("description")
            .and_then(Json::as_str)
            .unwrap_or_default()
            .to_string(),
        portable: false,
        location: slot,
        door: Some(DoorInfo {
            open: obj.get("open").and_then(Json::as_bool).unwrap_or(true),
            locked: obj.get("locked").and_then(Json::as_bool).unwrap_or(false),
            lock_id: obj
                .get("lock_id")
                .and_then(Json::as_str)
                .map(LockId::from),
        }),
        ..Item::default()
    })
}

/// Fold a legacy `player`/`player_state` section into the actors map, or
/// synthesize the player actor from metadata when neither is present.
fn apply_player_section(doc: &JsonMap<String, Json>, state: &mut GameState) -> Result<(), SchemaError> {
    let section = doc.get("player").or_else(|| doc.get("player_state"));
    let player_id = ActorId::player();

    if let Some(raw) = section {
        let obj = raw.as_object().ok_or(SchemaError::BadEntry {
            kind: "player",
            id: PLAYER_ID.to_string(),
            detail: "must be an object".into(),
        })?;
        let player = state.actors.entry(player_id.clone()).or_insert_with(|| Actor {
            id: player_id.clone(),
            name: "Player".to_string(),
            ..Actor::default()
        });
        if let Some(location) = obj.get("location").and_then(Json::as_str) {
            player.location = LocationId::from(location);
        }
        if let Some(inventory) = obj.get("inventory").and_then(Json::as_array) {
            player.inventory = inventory
                .iter()
                .filter_map(Json::as_str)
                .map(ItemId::from)
                .collect();
        }
        for bag in ["flags", "stats"] {
            if let Some(val) = obj.get(bag) {
                player.properties.insert(bag.to_string(), json_to_value(val));
            }
        }
    } else if !state.actors.contains_key(&player_id) {
        state.actors.insert(
            player_id.clone(),
            Actor {
                id: player_id,
                name: "Player".to_string(),
                location: state.metadata.start_location.clone(),
                ..Actor::default()
            },
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixture_world() -> Json {
        json!({
            "metadata": {
                "title": "Test World",
                "start_location": "loc_hall"
            },
            "locations": [
                {
                    "id": "loc_hall",
                    "name": "Hall",
                    "description": "A drafty hall.",
                    "items": ["item_coin"],
                    "exits": {
                        "east": {
                            "type": "door",
                            "to": "loc_study",
                            "door_id": "item_oak_door"
                        }
                    }
                },
                { "id": "loc_study", "name": "Study", "description": "Books everywhere." }
            ],
            "items": [
                {
                    "id": "item_coin",
                    "name": "coin",
                    "description": "A dull copper coin.",
                    "portable": true,
                    "location": "loc_hall",
                    "llm_context": { "traits": ["small", "tarnished"] }
                },
                {
                    "id": "item_oak_door",
                    "name": "oak door",
                    "description": "A heavy oak door.",
                    "location": "exit:loc_hall:east",
                    "door": { "open": false, "locked": false }
                }
            ],
            "actors": [
                { "id": "player", "name": "You", "location": "loc_hall" }
            ],
            "weather_system": { "season": "autumn" }
        })
    }

    #[test]
    fn parses_fixture_world() {
        let state = parse_game_state(&fixture_world()).unwrap();
        assert_eq!(state.metadata.title, "Test World");
        assert_eq!(state.locations.len(), 2);
        assert_eq!(state.items.len(), 2);
        assert!(state.player().is_some());
    }

    #[test]
    fn llm_context_merges_into_properties() {
        let state = parse_game_state(&fixture_world()).unwrap();
        let coin = state.get_item(&ItemId::from("item_coin")).unwrap();
        let traits = coin.llm_context().unwrap().get("traits").unwrap();
        assert_eq!(traits.as_str_list(), vec!["small", "tarnished"]);
    }

    #[test]
    fn unknown_top_level_keys_survive_in_extra() {
        let state = parse_game_state(&fixture_world()).unwrap();
        assert_eq!(
            state.extra.get("weather_system").and_then(|w| w.get("season")),
            Some(&Value::Str("autumn".into()))
        );
    }

    #[test]
    fn round_trip_is_semantically_identical() {
        let first = parse_game_state(&fixture_world()).unwrap();
        let emitted = serialize_game_state(&first);
        let second = parse_game_state(&emitted).unwrap();

        assert_eq!(serialize_game_state(&first), serialize_game_state(&second));
        assert_eq!(first.extra, second.extra);
        assert_eq!(first.turn, second.turn);
    }

    #[test]
    fn missing_metadata_is_a_schema_error() {
        let err = parse_game_state(&json!({"locations": []})).unwrap_err();
        assert!(matches!(err, SchemaError::MissingSection("metadata")));
    }

    #[test]
    fn non_string_id_is_a_schema_error() {
        let raw = json!({
            "metadata": {"title": "x"},
            "items": [{"id": 42, "name": "bad"}]
        });
        let err = parse_game_state(&raw).unwrap_err();
        assert!(matches!(err, SchemaError::MissingId { kind: "item" }));
    }

    #[test]
    fn duplicate_same_kind_id_is_rejected() {
        let raw = json!({
            "metadata": {"title": "x"},
            "items": [
                {"id": "item_a", "location": ""},
                {"id": "item_a", "location": ""}
            ]
        });
        let err = parse_game_state(&raw).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateId { kind: "item", .. }));
    }

    #[test]
    fn accepts_player_state_alias() {
        let raw = json!({
            "metadata": {"title": "x", "start_location": "loc_a"},
            "locations": [{"id": "loc_a", "name": "A", "description": "a"}],
            "player_state": {"location": "loc_a", "inventory": [], "flags": {"seen_intro": true}}
        });
        let state = parse_game_state(&raw).unwrap();
        let player = state.player().unwrap();
        assert_eq!(player.location, LocationId::from("loc_a"));
        assert!(player.flag("seen_intro").is_some_and(Value::truthy));
    }

    #[test]
    fn synthesizes_player_from_metadata_when_absent() {
        let raw = json!({
            "metadata": {"title": "x", "start_location": "loc_a"},
            "locations": [{"id": "loc_a", "name": "A", "description": "a"}]
        });
        let state = parse_game_state(&raw).unwrap();
        assert_eq!(state.player().unwrap().location, LocationId::from("loc_a"));
    }

    #[test]
    fn legacy_doors_become_door_items_in_exit_slots() {
        let raw = json!({
            "metadata": {"title": "x", "start_location": "loc_a"},
            "locations": [
                {
                    "id": "loc_a", "name": "A", "description": "a",
                    "exits": {"north": {"type": "door", "to": "loc_b", "door_id": "door_iron"}}
                },
                {"id": "loc_b", "name": "B", "description": "b"}
            ],
            "doors": [
                {"id": "door_iron", "locations": ["loc_a", "loc_b"], "description": "An iron door.", "open": false, "locked": true, "lock_id": "lock_iron"}
            ],
            "locks": [
                {"id": "lock_iron", "opens_with": []}
            ]
        });
        let state = parse_game_state(&raw).unwrap();
        let door = state.get_item(&ItemId::from("door_iron")).unwrap();
        assert_eq!(door.location, "exit:loc_a:north");
        let info = door.door.as_ref().unwrap();
        assert!(!info.open);
        assert!(info.locked);
        assert_eq!(info.lock_id.as_ref().unwrap(), "lock_iron");
    }

    #[test]
    fn load_game_state_reads_and_validates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.json");
        std::fs::write(&path, serde_json::to_string_pretty(&fixture_world()).unwrap()).unwrap();
        let state = load_game_state(&path).unwrap();
        assert_eq!(state.metadata.title, "Test World");
    }

    #[test]
    fn load_game_state_rejects_dangling_reference() {
        let mut raw = fixture_world();
        raw["items"][0]["location"] = json!("loc_nowhere");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.json");
        std::fs::write(&path, serde_json::to_string(&raw).unwrap()).unwrap();
        assert!(matches!(
            load_game_state(&path),
            Err(WorldLoadError::Validation(_))
        ));
    }
}
