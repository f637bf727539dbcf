//! Entity search: resolving parsed nouns to world entities.
//!
//! Handlers resolve nouns with three rules: name matching (primary word
//! and synonyms against entity names), adjective filtering (prefer
//! entities whose description mentions the adjective), and scope (what the
//! acting actor can actually reach — its location, its inventory, open
//! containers and surfaces around it).

use crate::accessor::StateAccessor;
use crate::action::WordRef;

use skein_data::{ActorId, ExitDef, ItemId, Location, LocationId, LockId};

/// Case-insensitive name match against a parsed word and its synonyms.
pub fn name_matches(word: &WordRef, entity_name: &str) -> bool {
    let name = entity_name.to_lowercase();
    word.forms().any(|form| {
        let form = form.to_lowercase();
        !form.is_empty() && (name.contains(&form) || form.contains(&name))
    })
}

fn adjective_matches(adjective: &str, name: &str, description: &str) -> bool {
    let adjective = adjective.to_lowercase();
    name.to_lowercase().contains(&adjective) || description.to_lowercase().contains(&adjective)
}

/// Item ids reachable by an actor: its location's items, its inventory,
/// and the contents of open containers and surfaces in the location.
pub fn accessible_item_ids(accessor: &StateAccessor, actor_id: &ActorId) -> Vec<ItemId> {
    let mut ids = Vec::new();
    let Some(actor) = accessor.get_actor(actor_id) else {
        return ids;
    };
    let location_id = actor.location.clone();

    for item in accessor.get_items_in_location(&location_id) {
        ids.push(item.id.clone());
        if let Some(container) = &item.container {
            if container.open || container.is_surface {
                for inner in accessor.get_items_in_container(&item.id) {
                    ids.push(inner.id.clone());
                }
            }
        }
    }
    for item_id in &actor.inventory {
        if !ids.contains(item_id) {
            ids.push(item_id.clone());
        }
    }
    ids
}

/// Pick the best name match from candidates: with an adjective, matches
/// whose name or description mention it win; otherwise first match.
fn pick_item(
    accessor: &StateAccessor,
    candidates: &[ItemId],
    word: &WordRef,
    adjective: Option<&str>,
) -> Option<ItemId> {
    let mut fallback = None;
    for id in candidates {
        let Some(item) = accessor.get_item(id) else {
            continue;
        };
        if !name_matches(word, &item.name) {
            continue;
        }
        match adjective {
            Some(adj) if adjective_matches(adj, &item.name, &item.description) => {
                return Some(id.clone());
            },
            Some(_) => fallback = fallback.or_else(|| Some(id.clone())),
            None => return Some(id.clone()),
        }
    }
    fallback
}

/// Find an item the actor can reach by name, with optional adjective
/// disambiguation.
pub fn find_accessible_item(
    accessor: &StateAccessor,
    word: &WordRef,
    actor_id: &ActorId,
    adjective: Option<&str>,
) -> Option<ItemId> {
    let scope = accessible_item_ids(accessor, actor_id);
    pick_item(accessor, &scope, word, adjective)
}

/// Find an item in the actor's inventory by name.
pub fn find_item_in_inventory(accessor: &StateAccessor, word: &WordRef, actor_id: &ActorId) -> Option<ItemId> {
    let inventory = accessor.get_actor(actor_id)?.inventory.clone();
    pick_item(accessor, &inventory, word, None)
}

/// Find a container item in a location by name, with optional adjective.
pub fn find_container_with_adjective(
    accessor: &StateAccessor,
    word: &WordRef,
    adjective: Option<&str>,
    location_id: &LocationId,
) -> Option<ItemId> {
    let candidates: Vec<ItemId> = accessor
        .get_items_in_location(location_id)
        .into_iter()
        .filter(|item| item.container.is_some())
        .map(|item| item.id.clone())
        .collect();
    pick_item(accessor, &candidates, word, adjective)
}

/// Find an item inside one specific container.
pub fn find_item_in_container(
    accessor: &StateAccessor,
    word: &WordRef,
    container_id: &ItemId,
    adjective: Option<&str>,
) -> Option<ItemId> {
    let candidates: Vec<ItemId> = accessor
        .get_items_in_container(container_id)
        .into_iter()
        .map(|item| item.id.clone())
        .collect();
    pick_item(accessor, &candidates, word, adjective)
}

/// Find another actor in the seeker's location by name.
pub fn find_actor_by_name(accessor: &StateAccessor, word: &WordRef, seeker_id: &ActorId) -> Option<ActorId> {
    let location = accessor.get_actor(seeker_id)?.location.clone();
    accessor
        .state
        .actors_in_location(&location)
        .into_iter()
        .find(|actor| actor.id != *seeker_id && name_matches(word, &actor.name))
        .map(|actor| actor.id.clone())
}

/// Does the actor carry any key that opens this lock?
pub fn actor_has_key(accessor: &StateAccessor, actor_id: &ActorId, lock_id: &LockId) -> bool {
    let Some(lock) = accessor.get_lock(lock_id) else {
        return false;
    };
    let Some(actor) = accessor.get_actor(actor_id) else {
        return false;
    };
    lock.opens_with.iter().any(|key| actor.inventory.contains(key))
}

/// Door items guarding this location's exits, in exit order.
pub fn doors_in_location(accessor: &StateAccessor, location_id: &LocationId) -> Vec<ItemId> {
    let Some(location) = accessor.get_location(location_id) else {
        return Vec::new();
    };
    location
        .exits
        .values()
        .filter_map(|exit| exit.door_id.clone())
        .filter(|door_id| accessor.get_item(door_id).is_some_and(skein_data::Item::is_door))
        .collect()
}

/// Smart door selection. An explicit adjective overrides everything;
/// otherwise doors are ranked by usefulness for the verb at hand: a door
/// the actor holds a key for (when unlocking), then closed-but-unlocked,
/// then locked, then open.
pub fn find_door_with_adjective(
    accessor: &StateAccessor,
    word: &WordRef,
    adjective: Option<&str>,
    location_id: &LocationId,
    actor_id: &ActorId,
    verb: &str,
) -> Option<ItemId> {
    let doors: Vec<ItemId> = doors_in_location(accessor, location_id)
        .into_iter()
        .filter(|id| {
            accessor
                .get_item(id)
                .is_some_and(|item| name_matches(word, &item.name) || word.forms().any(|f| f == "door"))
        })
        .collect();

    if let Some(adj) = adjective {
        return doors.into_iter().find(|id| {
            accessor
                .get_item(id)
                .is_some_and(|item| adjective_matches(adj, &item.name, &item.description))
        });
    }

    doors
        .into_iter()
        .min_by_key(|id| door_rank(accessor, id, actor_id, verb))
}

fn door_rank(accessor: &StateAccessor, door_id: &ItemId, actor_id: &ActorId, verb: &str) -> u8 {
    let Some(door) = accessor.get_item(door_id).and_then(|item| item.door.as_ref()) else {
        return u8::MAX;
    };
    let keyed = door
        .lock_id
        .as_ref()
        .is_some_and(|lock| actor_has_key(accessor, actor_id, lock));
    if verb == "unlock" && door.locked && keyed {
        return 0;
    }
    if !door.open && !door.locked {
        return 1;
    }
    if door.locked {
        return 2;
    }
    3
}

/// Match a direction token or named exit ("spiral staircase") against a
/// location's exits.
pub fn find_exit_by_name<'a>(location: &'a Location, word: &WordRef) -> Option<(&'a str, &'a ExitDef)> {
    // exact direction token first
    for (direction, exit) in &location.exits {
        if word.forms().any(|form| form == direction) {
            return Some((direction.as_str(), exit));
        }
    }
    // then named exits by substring
    location
        .exits
        .iter()
        .find(|(_, exit)| exit.name.as_deref().is_some_and(|name| name_matches(word, name)))
        .map(|(direction, exit)| (direction.as_str(), exit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::BehaviorManager;
    use skein_data::{Actor, ContainerInfo, DoorInfo, ExitKind, GameState, Item, Location, Lock, Metadata};

    fn world() -> GameState {
        let mut state = GameState {
            metadata: Metadata {
                start_location: LocationId::from("loc_hall"),
                ..Metadata::default()
            },
            ..GameState::default()
        };
        let mut hall = Location {
            id: LocationId::from("loc_hall"),
            name: "Hall".into(),
            ..Location::default()
        };
        hall.items = vec![
            ItemId::from("item_table"),
            ItemId::from("item_rock"),
            ItemId::from("item_red_lever"),
            ItemId::from("item_rusty_lever"),
        ];
        state.locations.insert(hall.id.clone(), hall);

        let mut table = Item {
            id: ItemId::from("item_table"),
            name: "table".into(),
            description: "A rough wooden table.".into(),
            location: "loc_hall".into(),
            ..Item::default()
        };
        table.container = Some(ContainerInfo {
            is_surface: true,
            ..ContainerInfo::default()
        });
        state.items.insert(table.id.clone(), table);

        for (id, name, desc) in [
            ("item_rock", "rock", "A plain gray rock."),
            ("item_red_lever", "lever", "A lever painted red."),
            ("item_rusty_lever", "lever", "A rusty old lever."),
        ] {
            state.items.insert(
                ItemId::from(id),
                Item {
                    id: ItemId::from(id),
                    name: name.into(),
                    description: desc.into(),
                    portable: true,
                    location: "loc_hall".into(),
                    ..Item::default()
                },
            );
        }

        state.items.insert(
            ItemId::from("item_coin"),
            Item {
                id: ItemId::from("item_coin"),
                name: "coin".into(),
                description: "A copper coin.".into(),
                portable: true,
                location: "item_table".into(),
                ..Item::default()
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
        state.actors.insert(
            ActorId::from("npc_scholar"),
            Actor {
                id: ActorId::from("npc_scholar"),
                name: "weary scholar".into(),
                location: LocationId::from("loc_hall"),
                ..Actor::default()
            },
        );
        state
    }

    fn with_accessor<T>(state: &mut GameState, run: impl FnOnce(&StateAccessor) -> T) -> T {
        let manager = BehaviorManager::new(vec![]).unwrap();
        let accessor = StateAccessor::new(state, &manager);
        run(&accessor)
    }

    #[test]
    fn surface_contents_are_in_scope() {
        let mut state = world();
        with_accessor(&mut state, |accessor| {
            let found = find_accessible_item(accessor, &WordRef::new("coin"), &ActorId::player(), None);
            assert_eq!(found, Some(ItemId::from("item_coin")));
        });
    }

    #[test]
    fn closed_container_contents_are_out_of_scope() {
        let mut state = world();
        state.items.get_mut(&ItemId::from("item_table")).unwrap().container = Some(ContainerInfo::default());
        with_accessor(&mut state, |accessor| {
            let found = find_accessible_item(accessor, &WordRef::new("coin"), &ActorId::player(), None);
            assert_eq!(found, None);
        });
    }

    #[test]
    fn adjective_disambiguates_between_same_names() {
        let mut state = world();
        with_accessor(&mut state, |accessor| {
            let rusty = find_accessible_item(accessor, &WordRef::new("lever"), &ActorId::player(), Some("rusty"));
            assert_eq!(rusty, Some(ItemId::from("item_rusty_lever")));
            let red = find_accessible_item(accessor, &WordRef::new("lever"), &ActorId::player(), Some("red"));
            assert_eq!(red, Some(ItemId::from("item_red_lever")));
        });
    }

    #[test]
    fn synonyms_participate_in_matching() {
        let mut state = world();
        with_accessor(&mut state, |accessor| {
            let word = WordRef::with_synonyms("boulder", &["rock"]);
            let found = find_accessible_item(accessor, &word, &ActorId::player(), None);
            assert_eq!(found, Some(ItemId::from("item_rock")));
        });
    }

    #[test]
    fn find_actor_skips_the_seeker() {
        let mut state = world();
        with_accessor(&mut state, |accessor| {
            let found = find_actor_by_name(accessor, &WordRef::new("scholar"), &ActorId::player());
            assert_eq!(found, Some(ActorId::from("npc_scholar")));
            let not_self = find_actor_by_name(accessor, &WordRef::new("scholar"), &ActorId::from("npc_scholar"));
            assert_eq!(not_self, None);
        });
    }

    fn door_world() -> GameState {
        let mut state = world();
        let mut exits = std::collections::BTreeMap::new();
        for (direction, door_id) in [("east", "item_east_door"), ("west", "item_west_door")] {
            exits.insert(
                direction.to_string(),
                ExitDef {
                    kind: ExitKind::Door,
                    to: Some(LocationId::from("loc_hall")),
                    door_id: Some(ItemId::from(door_id)),
                    ..ExitDef::default()
                },
            );
        }
        state.locations.get_mut(&LocationId::from("loc_hall")).unwrap().exits = exits;

        state.items.insert(
            ItemId::from("item_east_door"),
            Item {
                id: ItemId::from("item_east_door"),
                name: "iron door".into(),
                description: "A heavy iron door.".into(),
                location: "exit:loc_hall:east".into(),
                door: Some(DoorInfo {
                    locked: true,
                    lock_id: Some(LockId::from("lock_iron")),
                    ..DoorInfo::default()
                }),
                ..Item::default()
            },
        );
        state.items.insert(
            ItemId::from("item_west_door"),
            Item {
                id: ItemId::from("item_west_door"),
                name: "oak door".into(),
                description: "A plain oak door.".into(),
                location: "exit:loc_hall:west".into(),
                door: Some(DoorInfo {
                    open: true,
                    ..DoorInfo::default()
                }),
                ..Item::default()
            },
        );
        state.locks.insert(
            LockId::from("lock_iron"),
            Lock {
                id: LockId::from("lock_iron"),
                opens_with: vec![ItemId::from("item_iron_key")],
                ..Lock::default()
            },
        );
        state.items.insert(
            ItemId::from("item_iron_key"),
            Item {
                id: ItemId::from("item_iron_key"),
                name: "iron key".into(),
                portable: true,
                location: "player".into(),
                ..Item::default()
            },
        );
        state
            .actors
            .get_mut(&ActorId::player())
            .unwrap()
            .inventory
            .push(ItemId::from("item_iron_key"));
        state
    }

    #[test]
    fn unlock_prefers_the_door_with_a_held_key() {
        let mut state = door_world();
        with_accessor(&mut state, |accessor| {
            let chosen = find_door_with_adjective(
                accessor,
                &WordRef::new("door"),
                None,
                &LocationId::from("loc_hall"),
                &ActorId::player(),
                "unlock",
            );
            assert_eq!(chosen, Some(ItemId::from("item_east_door")));
        });
    }

    #[test]
    fn open_prefers_closed_unlocked_doors() {
        let mut state = door_world();
        // make the west door closed and unlocked; it should win for "open"
        state.items.get_mut(&ItemId::from("item_west_door")).unwrap().door = Some(DoorInfo::default());
        with_accessor(&mut state, |accessor| {
            let chosen = find_door_with_adjective(
                accessor,
                &WordRef::new("door"),
                None,
                &LocationId::from("loc_hall"),
                &ActorId::player(),
                "open",
            );
            assert_eq!(chosen, Some(ItemId::from("item_west_door")));
        });
    }

    #[test]
    fn explicit_adjective_overrides_door_ranking() {
        let mut state = door_world();
        with_accessor(&mut state, |accessor| {
            let chosen = find_door_with_adjective(
                accessor,
                &WordRef::new("door"),
                Some("oak"),
                &LocationId::from("loc_hall"),
                &ActorId::player(),
                "unlock",
            );
            assert_eq!(chosen, Some(ItemId::from("item_west_door")));
        });
    }

    #[test]
    fn named_exits_match_by_substring() {
        let mut location = Location {
            id: LocationId::from("loc_tower"),
            ..Location::default()
        };
        location.exits.insert(
            "up".into(),
            ExitDef {
                name: Some("spiral staircase".into()),
                to: Some(LocationId::from("loc_roof")),
                ..ExitDef::default()
            },
        );
        let (direction, _) = find_exit_by_name(&location, &WordRef::new("staircase")).unwrap();
        assert_eq!(direction, "up");
        assert!(find_exit_by_name(&location, &WordRef::new("elevator")).is_none());
    }
}
