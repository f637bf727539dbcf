//! Load-time validation of world invariants.
//!
//! Each function checks one invariant family and pushes human-readable
//! messages; [`validate_game_state`] runs them all and aggregates. A world
//! that fails validation never reaches the engine.
//!
//! One asymmetry is deliberate: a location that lists an item whose
//! `location` field points elsewhere is an error, while an item that
//! claims a location which doesn't list it back is only logged — stale
//! listings mislead scope queries, missing listings are repaired by the
//! first relocation.

use crate::defs::GameState;
use crate::ids::{ActorId, ItemId, LocationId, PLAYER_ID, parse_exit_slot};

use log::warn;
use std::collections::BTreeMap;
use std::fmt;

/// The world fails structural invariants. Carries every message found so
/// authors can fix a batch at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub errors: Vec<String>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "found {} validation error(s) in game state:", self.errors.len())?;
        for err in &self.errors {
            writeln!(f, "  - {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Run every validator; `Ok` means the §3.3 invariants all hold.
///
/// # Errors
/// [`ValidationError`] aggregating every message from every validator.
pub fn validate_game_state(state: &GameState) -> Result<(), ValidationError> {
    let mut errors = Vec::new();
    let registry = build_registry(state, &mut errors);

    validate_metadata(state, &mut errors);
    validate_references(state, &registry, &mut errors);
    validate_item_locations(state, &registry, &mut errors);
    validate_list_consistency(state, &mut errors);
    validate_inventory_consistency(state, &mut errors);
    validate_container_cycles(state, &mut errors);
    validate_door_placement(state, &mut errors);
    validate_lock_coherence(state, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { errors })
    }
}

/// Build the global id registry, flagging reserved-id misuse and
/// cross-kind duplicates. (Same-kind duplicates are caught at parse time,
/// before the id maps collapse them.)
fn build_registry(state: &GameState, errors: &mut Vec<String>) -> BTreeMap<String, &'static str> {
    let mut registry = BTreeMap::new();
    registry.insert(PLAYER_ID.to_string(), "player");

    let mut claim = |id: &str, kind: &'static str, errors: &mut Vec<String>| {
        if id == PLAYER_ID && kind != "actor" {
            errors.push(format!("[{kind}:{id}] cannot use reserved id 'player'"));
            return;
        }
        if id == PLAYER_ID {
            return; // the player actor owns the reserved slot
        }
        if let Some(existing) = registry.insert(id.to_string(), kind) {
            errors.push(format!("[{kind}:{id}] duplicate id - already used by {existing}"));
        }
    };

    for id in state.locations.keys() {
        claim(id.as_str(), "location", errors);
    }
    for id in state.items.keys() {
        claim(id.as_str(), "item", errors);
    }
    for id in state.actors.keys() {
        claim(id.as_str(), "actor", errors);
    }
    for id in state.locks.keys() {
        claim(id.as_str(), "lock", errors);
    }
    for script in &state.scripts {
        claim(&script.id, "script", errors);
    }
    registry
}

fn validate_metadata(state: &GameState, errors: &mut Vec<String>) {
    let start = &state.metadata.start_location;
    if start.as_str().is_empty() {
        errors.push("[metadata] start_location is empty".to_string());
    } else if !state.locations.contains_key(start) {
        errors.push(format!("[metadata] start_location '{start}' not found in locations"));
    }
    if state.player().is_none() {
        errors.push("[actors] no actor carries the reserved 'player' id".to_string());
    }
}

fn validate_references(state: &GameState, registry: &BTreeMap<String, &'static str>, errors: &mut Vec<String>) {
    for location in state.locations.values() {
        for (direction, exit) in &location.exits {
            if let Some(to) = &exit.to {
                match registry.get(to.as_str()) {
                    Some(&"location") => {},
                    Some(kind) => errors.push(format!(
                        "[location:{}] exit '{direction}' destination '{to}' is a {kind}, not a location",
                        location.id
                    )),
                    None => errors.push(format!(
                        "[location:{}] exit '{direction}' references unknown location '{to}'",
                        location.id
                    )),
                }
            }
            if exit.kind.is_door() {
                match &exit.door_id {
                    None => errors.push(format!(
                        "[location:{}] exit '{direction}' has type 'door' but no door_id",
                        location.id
                    )),
                    Some(door_id) if !state.items.contains_key(door_id) => errors.push(format!(
                        "[location:{}] exit '{direction}' references unknown door '{door_id}'",
                        location.id
                    )),
                    Some(door_id) => {
                        if state.get_item(door_id).is_some_and(|item| !item.is_door()) {
                            errors.push(format!(
                                "[location:{}] exit '{direction}' door '{door_id}' has no door property",
                                location.id
                            ));
                        }
                    },
                }
            }
        }
    }

    for lock in state.locks.values() {
        for key_id in &lock.opens_with {
            if !state.items.contains_key(key_id) {
                errors.push(format!("[lock:{}] key '{key_id}' not found in items", lock.id));
            }
        }
    }

    for actor in state.actors.values() {
        if !state.locations.contains_key(&actor.location) {
            errors.push(format!(
                "[actor:{}] location '{}' not found in locations",
                actor.id, actor.location
            ));
        }
        for item_id in &actor.inventory {
            if !state.items.contains_key(item_id) {
                errors.push(format!("[actor:{}] inventory item '{item_id}' not found", actor.id));
            }
        }
    }
}

/// Item location kind rules: a location id, a container item id, an actor
/// id, `"player"`, an exit slot, or empty (consumed).
fn validate_item_locations(state: &GameState, registry: &BTreeMap<String, &'static str>, errors: &mut Vec<String>) {
    for item in state.items.values() {
        let raw = item.location.as_str();
        if raw.is_empty() {
            continue; // consumed, deliberately nowhere
        }
        if let Some((loc, direction)) = parse_exit_slot(raw) {
            if !state.locations.contains_key(&loc) {
                errors.push(format!("[item:{}] exit slot names unknown location '{loc}'", item.id));
            } else if state.get_location(&loc).is_some_and(|l| !l.has_exit(direction)) {
                errors.push(format!(
                    "[item:{}] exit slot names missing exit '{direction}' in '{loc}'",
                    item.id
                ));
            }
            continue;
        }
        match registry.get(raw) {
            Some(&"location" | &"actor" | &"player") => {},
            Some(&"item") => {
                let container = ItemId::from(raw);
                if state.get_item(&container).is_some_and(|c| c.container.is_none()) {
                    errors.push(format!(
                        "[item:{}] located in item '{container}' which is not a container",
                        item.id
                    ));
                }
            },
            Some(kind) => errors.push(format!(
                "[item:{}] location '{raw}' is a {kind}; items live in locations, containers, actors, or exit slots",
                item.id
            )),
            None => errors.push(format!(
                "[item:{}] location '{raw}' not found in global id registry",
                item.id
            )),
        }
    }
}

/// Denormalized list consistency (locations' items/actors lists).
fn validate_list_consistency(state: &GameState, errors: &mut Vec<String>) {
    for location in state.locations.values() {
        for item_id in &location.items {
            match state.get_item(item_id) {
                None => errors.push(format!("[location:{}] lists unknown item '{item_id}'", location.id)),
                Some(item) if item.location != location.id.as_str() => errors.push(format!(
                    "[location:{}] lists item '{item_id}' but that item's location field is '{}'",
                    location.id, item.location
                )),
                Some(_) => {},
            }
        }
        for actor_id in &location.actors {
            match state.get_actor(actor_id) {
                None => errors.push(format!("[location:{}] lists unknown actor '{actor_id}'", location.id)),
                Some(actor) if actor.location != location.id => errors.push(format!(
                    "[location:{}] lists actor '{actor_id}' but that actor's location field is '{}'",
                    location.id, actor.location
                )),
                Some(_) => {},
            }
        }
    }

    // the inverse direction is a warning, not an error
    for item in state.items.values() {
        let loc = LocationId::from(item.location.as_str());
        if let Some(location) = state.get_location(&loc) {
            if !location.items.contains(&item.id) {
                warn!(
                    "[item:{}] claims location '{}' which does not list it; will self-heal on first move",
                    item.id, loc
                );
            }
        }
    }
}

/// Inventory ↔ location agreement in both directions.
fn validate_inventory_consistency(state: &GameState, errors: &mut Vec<String>) {
    for actor in state.actors.values() {
        for item_id in &actor.inventory {
            if let Some(item) = state.get_item(item_id) {
                if item.location != actor.id.as_str() {
                    errors.push(format!(
                        "[actor:{}] inventory lists '{item_id}' but that item's location field is '{}'",
                        actor.id, item.location
                    ));
                }
            }
        }
    }
    for item in state.items.values() {
        let holder = ActorId::from(item.location.as_str());
        if let Some(actor) = state.get_actor(&holder) {
            if !actor.inventory.contains(&item.id) {
                errors.push(format!(
                    "[item:{}] located on actor '{holder}' but absent from that actor's inventory",
                    item.id
                ));
            }
        }
    }
}

/// The container graph must be acyclic.
fn validate_container_cycles(state: &GameState, errors: &mut Vec<String>) {
    for start in state.items.values() {
        let mut path: Vec<&str> = vec![start.id.as_str()];
        let mut current = start;
        // walk up through enclosing containers; a revisit is a cycle
        while let Some(container) = state.get_item(&ItemId::from(current.location.as_str())) {
            if path.contains(&container.id.as_str()) {
                path.push(container.id.as_str());
                errors.push(format!("container cycle detected: {}", path.join(" -> ")));
                break;
            }
            path.push(container.id.as_str());
            current = container;
        }
    }
}

/// Door placement: a door item sits in an exit slot, and that exit points
/// back at the door.
fn validate_door_placement(state: &GameState, errors: &mut Vec<String>) {
    for item in state.items.values() {
        if !item.is_door() || item.is_consumed() {
            continue;
        }
        let Some((loc, direction)) = item.exit_slot() else {
            errors.push(format!(
                "[item:{}] has a door property but location '{}' is not an exit slot",
                item.id, item.location
            ));
            continue;
        };
        let backlink = state
            .get_location(&loc)
            .and_then(|l| l.resolve_exit(direction))
            .and_then(|exit| exit.door_id.as_ref());
        if backlink != Some(&item.id) {
            errors.push(format!(
                "[item:{}] sits in slot 'exit:{loc}:{direction}' but that exit does not point back at it",
                item.id
            ));
        }
    }
}

/// A locked door or container must name an existing lock.
fn validate_lock_coherence(state: &GameState, errors: &mut Vec<String>) {
    for item in state.items.values() {
        let facets = [
            item.door.as_ref().map(|d| ("door", d.locked, d.lock_id.as_ref())),
            item.container
                .as_ref()
                .map(|c| ("container", c.locked, c.lock_id.as_ref())),
        ];
        for (facet, locked, lock_id) in facets.into_iter().flatten() {
            match lock_id {
                Some(lock_id) if !state.locks.contains_key(lock_id) => {
                    errors.push(format!("[item:{}] {facet} references unknown lock '{lock_id}'", item.id));
                },
                None if locked => {
                    errors.push(format!("[item:{}] {facet} is locked but names no lock", item.id));
                },
                _ => {},
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defs::{Actor, ContainerInfo, DoorInfo, ExitDef, ExitKind, Item, Location, Lock, Metadata};
    use crate::ids::LockId;

    fn valid_state() -> GameState {
        let mut state = GameState {
            metadata: Metadata {
                title: "Fixture".into(),
                start_location: LocationId::from("loc_hall"),
                ..Metadata::default()
            },
            ..GameState::default()
        };
        state.locations.insert(
            LocationId::from("loc_hall"),
            Location {
                id: LocationId::from("loc_hall"),
                name: "Hall".into(),
                description: "A hall".into(),
                ..Location::default()
            },
        );
        state.actors.insert(
            ActorId::player(),
            Actor {
                id: ActorId::player(),
                name: "You".into(),
                location: LocationId::from("loc_hall"),
                ..Actor::default()
            },
        );
        state
    }

    fn add_item(state: &mut GameState, id: &str, location: &str) {
        state.items.insert(
            ItemId::from(id),
            Item {
                id: ItemId::from(id),
                name: id.to_string(),
                location: location.to_string(),
                ..Item::default()
            },
        );
    }

    #[test]
    fn valid_state_passes() {
        assert!(validate_game_state(&valid_state()).is_ok());
    }

    #[test]
    fn reserved_id_misuse_is_rejected() {
        let mut state = valid_state();
        add_item(&mut state, "player", "loc_hall");
        let err = validate_game_state(&state).unwrap_err();
        assert!(err.errors.iter().any(|e| e.contains("reserved id")));
    }

    #[test]
    fn cross_kind_duplicate_is_rejected() {
        let mut state = valid_state();
        add_item(&mut state, "loc_hall", "loc_hall");
        let err = validate_game_state(&state).unwrap_err();
        assert!(err.errors.iter().any(|e| e.contains("duplicate id")));
    }

    #[test]
    fn missing_start_location_is_rejected() {
        let mut state = valid_state();
        state.metadata.start_location = LocationId::from("loc_void");
        let err = validate_game_state(&state).unwrap_err();
        assert!(err.errors.iter().any(|e| e.contains("start_location")));
    }

    #[test]
    fn dangling_item_location_is_rejected() {
        let mut state = valid_state();
        add_item(&mut state, "item_orb", "loc_void");
        let err = validate_game_state(&state).unwrap_err();
        assert!(err.errors.iter().any(|e| e.contains("not found in global id registry")));
    }

    #[test]
    fn item_inside_non_container_is_rejected() {
        let mut state = valid_state();
        add_item(&mut state, "item_rock", "loc_hall");
        add_item(&mut state, "item_coin", "item_rock");
        let err = validate_game_state(&state).unwrap_err();
        assert!(err.errors.iter().any(|e| e.contains("not a container")));
    }

    #[test]
    fn consumed_items_are_tolerated() {
        let mut state = valid_state();
        add_item(&mut state, "item_ash", "");
        assert!(validate_game_state(&state).is_ok());
    }

    #[test]
    fn location_listing_stale_item_is_rejected() {
        let mut state = valid_state();
        add_item(&mut state, "item_coin", "loc_hall");
        state
            .locations
            .get_mut(&LocationId::from("loc_hall"))
            .unwrap()
            .items
            .push(ItemId::from("item_coin"));
        // listed and consistent: fine
        assert!(validate_game_state(&state).is_ok());

        // now the item wanders off while the listing stays
        state.items.get_mut(&ItemId::from("item_coin")).unwrap().location = "player".to_string();
        state
            .actors
            .get_mut(&ActorId::player())
            .unwrap()
            .inventory
            .push(ItemId::from("item_coin"));
        let err = validate_game_state(&state).unwrap_err();
        assert!(err.errors.iter().any(|e| e.contains("location field is 'player'")));
    }

    #[test]
    fn inventory_must_agree_both_ways() {
        let mut state = valid_state();
        add_item(&mut state, "item_coin", "player");
        // item says player but inventory doesn't list it
        let err = validate_game_state(&state).unwrap_err();
        assert!(err.errors.iter().any(|e| e.contains("absent from that actor's inventory")));

        state
            .actors
            .get_mut(&ActorId::player())
            .unwrap()
            .inventory
            .push(ItemId::from("item_coin"));
        assert!(validate_game_state(&state).is_ok());
    }

    #[test]
    fn container_cycles_are_detected() {
        let mut state = valid_state();
        for id in ["item_box", "item_bag"] {
            state.items.insert(
                ItemId::from(id),
                Item {
                    id: ItemId::from(id),
                    name: id.into(),
                    container: Some(ContainerInfo::default()),
                    ..Item::default()
                },
            );
        }
        state.items.get_mut(&ItemId::from("item_box")).unwrap().location = "item_bag".into();
        state.items.get_mut(&ItemId::from("item_bag")).unwrap().location = "item_box".into();
        let err = validate_game_state(&state).unwrap_err();
        assert!(err.errors.iter().any(|e| e.contains("container cycle")));
    }

    #[test]
    fn door_outside_exit_slot_is_rejected() {
        let mut state = valid_state();
        state.items.insert(
            ItemId::from("item_door"),
            Item {
                id: ItemId::from("item_door"),
                name: "door".into(),
                location: "loc_hall".into(),
                door: Some(DoorInfo::default()),
                ..Item::default()
            },
        );
        let err = validate_game_state(&state).unwrap_err();
        assert!(err.errors.iter().any(|e| e.contains("not an exit slot")));
    }

    #[test]
    fn door_slot_must_backlink() {
        let mut state = valid_state();
        state.locations.insert(
            LocationId::from("loc_study"),
            Location {
                id: LocationId::from("loc_study"),
                name: "Study".into(),
                description: "books".into(),
                ..Location::default()
            },
        );
        state
            .locations
            .get_mut(&LocationId::from("loc_hall"))
            .unwrap()
            .exits
            .insert(
                "east".into(),
                ExitDef {
                    kind: ExitKind::Open, // exit exists but doesn't claim the door
                    to: Some(LocationId::from("loc_study")),
                    ..ExitDef::default()
                },
            );
        state.items.insert(
            ItemId::from("item_door"),
            Item {
                id: ItemId::from("item_door"),
                name: "door".into(),
                location: "exit:loc_hall:east".into(),
                door: Some(DoorInfo::default()),
                ..Item::default()
            },
        );
        let err = validate_game_state(&state).unwrap_err();
        assert!(err.errors.iter().any(|e| e.contains("does not point back")));
    }

    #[test]
    fn locked_without_lock_is_rejected() {
        let mut state = valid_state();
        state.items.insert(
            ItemId::from("item_chest"),
            Item {
                id: ItemId::from("item_chest"),
                name: "chest".into(),
                location: "loc_hall".into(),
                container: Some(ContainerInfo {
                    locked: true,
                    ..ContainerInfo::default()
                }),
                ..Item::default()
            },
        );
        let err = validate_game_state(&state).unwrap_err();
        assert!(err.errors.iter().any(|e| e.contains("names no lock")));
    }

    #[test]
    fn lock_keys_must_exist() {
        let mut state = valid_state();
        state.locks.insert(
            LockId::from("lock_brass"),
            Lock {
                id: LockId::from("lock_brass"),
                opens_with: vec![ItemId::from("item_ghost_key")],
                ..Lock::default()
            },
        );
        let err = validate_game_state(&state).unwrap_err();
        assert!(err.errors.iter().any(|e| e.contains("key 'item_ghost_key' not found")));
    }
}
