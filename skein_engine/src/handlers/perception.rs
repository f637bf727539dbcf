//! Perception handlers: look, examine, inventory.
//!
//! `describe_location` is also the auto-look used after movement, so the
//! narration a player gets on `go east` matches what `look` would say.

use crate::accessor::StateAccessor;
use crate::action::{HandlerResult, NarrationData, ParsedAction};
use crate::behavior::{BehaviorModule, HandlerFn};
use crate::handlers::{actor_and_location, display_name, item_data};
use crate::search::{find_accessible_item, find_actor_by_name, name_matches};
use crate::vocab::{NounDef, VerbDef, Vocabulary};

use skein_data::{ActorId, LocationId, Value};
use std::collections::BTreeMap;

/// Surfaces every location implicitly has. They exist as vocabulary only;
/// `examine` accepts them gracefully, nothing else does.
const UNIVERSAL_SURFACES: &[&str] = &["ceiling", "floor", "ground", "sky", "wall", "walls"];

pub fn module() -> BehaviorModule {
    BehaviorModule {
        path: "core.perception",
        vocabulary: Vocabulary {
            verbs: vec![
                VerbDef::new("look").with_synonyms(&["l"]),
                VerbDef::new("examine").with_synonyms(&["inspect", "x"]),
                VerbDef::new("inventory").with_synonyms(&["inv", "i"]).brief(),
            ],
            nouns: UNIVERSAL_SURFACES.iter().map(|s| NounDef::new(s)).collect(),
            ..Vocabulary::default()
        },
        handlers: vec![
            ("look", handle_look as HandlerFn),
            ("examine", handle_examine as HandlerFn),
            ("inventory", handle_inventory as HandlerFn),
        ],
        ..BehaviorModule::default()
    }
}

/// Compose the standard location description: name, prose, visible items
/// (floor items plus surface contents), actors, and exits. Returns the
/// text and the per-item narration payloads.
pub fn describe_location(accessor: &StateAccessor, location_id: &LocationId, viewer: &ActorId) -> (String, Vec<Value>) {
    let Some(location) = accessor.get_location(location_id) else {
        return ("You are nowhere at all.".to_string(), Vec::new());
    };
    let mut lines = vec![location.name.clone(), location.description.clone()];
    let mut payloads = Vec::new();

    let mut visible: Vec<String> = Vec::new();
    for item in accessor.get_items_in_location(location_id) {
        visible.push(item.name.clone());
        payloads.push(item_payload(item));
        if let Some(container) = &item.container {
            if container.is_surface || container.open {
                for inner in accessor.get_items_in_container(&item.id) {
                    let preposition = if container.is_surface { "on" } else { "in" };
                    visible.push(format!("{} ({preposition} the {})", inner.name, item.name));
                    payloads.push(item_payload(inner));
                }
            }
        }
    }
    if !visible.is_empty() {
        lines.push(format!("You see: {}.", visible.join(", ")));
    }

    let others: Vec<String> = accessor
        .state
        .actors_in_location(location_id)
        .into_iter()
        .filter(|actor| &actor.id != viewer && !actor.prop_bool("dead"))
        .map(|actor| actor.name.clone())
        .collect();
    if !others.is_empty() {
        lines.push(format!("Also here: {}.", others.join(", ")));
    }

    let exits: Vec<String> = location
        .exits
        .iter()
        .filter(|(_, exit)| !exit.hidden)
        .map(|(direction, exit)| match &exit.name {
            Some(name) => format!("{direction} ({name})"),
            None => direction.clone(),
        })
        .collect();
    if exits.is_empty() {
        lines.push("There are no obvious exits.".to_string());
    } else {
        lines.push(format!("Exits: {}.", exits.join(", ")));
    }

    (lines.join("\n"), payloads)
}

fn item_payload(item: &skein_data::Item) -> Value {
    let mut map = BTreeMap::new();
    map.insert("id".to_string(), Value::from(item.id.as_str()));
    map.insert("name".to_string(), Value::from(item.name.as_str()));
    if let Some(llm_context) = item.llm_context() {
        map.insert("llm_context".to_string(), llm_context.clone());
    }
    Value::Map(map)
}

/// Describe the actor's current location.
pub fn handle_look(accessor: &mut StateAccessor, action: &ParsedAction) -> HandlerResult {
    let (actor_id, location_id) = match actor_and_location(accessor, action) {
        Ok(pair) => pair,
        Err(failure) => return failure,
    };
    let (text, payloads) = describe_location(accessor, &location_id, &actor_id);
    HandlerResult::success(text).with_data(NarrationData {
        id: Some(location_id.0),
        items: payloads,
        ..NarrationData::default()
    })
}

/// Examine anything in scope: items (description, notable states, text,
/// open-container contents), actors, doors, or a universal surface.
pub fn handle_examine(accessor: &mut StateAccessor, action: &ParsedAction) -> HandlerResult {
    let (actor_id, location_id) = match actor_and_location(accessor, action) {
        Ok(pair) => pair,
        Err(failure) => return failure,
    };
    let Some(object) = action.object.as_ref() else {
        // bare "examine" reads as look
        let (text, payloads) = describe_location(accessor, &location_id, &actor_id);
        return HandlerResult::success(text).with_data(NarrationData {
            id: Some(location_id.0),
            items: payloads,
            ..NarrationData::default()
        });
    };
    let adjective = action.adjective.as_deref();

    if let Some(item_id) = find_accessible_item(accessor, object, &actor_id, adjective) {
        let item = accessor.get_item(&item_id).expect("item was just found");
        let mut lines = vec![item.description.clone()];
        if item.prop_bool("lit") {
            lines.push(format!("The {} is lit.", item.name));
        }
        if let Some(door) = &item.door {
            lines.push(door_state_line(&item.name, door.open, door.locked));
        }
        if let Some(container) = &item.container {
            if container.locked {
                lines.push(format!("The {} is locked.", item.name));
            } else if container.open || container.is_surface {
                let contents: Vec<String> = accessor
                    .get_items_in_container(&item_id)
                    .into_iter()
                    .map(|inner| inner.name.clone())
                    .collect();
                if contents.is_empty() {
                    lines.push(format!("The {} is empty.", item.name));
                } else {
                    lines.push(format!("Inside you see: {}.", contents.join(", ")));
                }
            } else {
                lines.push(format!("The {} is closed.", item.name));
            }
        }
        if item.prop_bool("readable") {
            if let Some(text) = item.prop_str("text") {
                lines.push(format!("Written on it: {text}"));
            }
        }
        let data = item_data(accessor, &item_id);
        return HandlerResult::success(lines.join("\n")).with_data(data);
    }

    // doors guarding exits of this location respond to "examine door"
    for door_id in crate::search::doors_in_location(accessor, &location_id) {
        if let Some(item) = accessor.get_item(&door_id) {
            if name_matches(object, &item.name) || object.forms().any(|f| f == "door") {
                let door = item.door.clone().unwrap_or_default();
                let text = format!(
                    "{}\n{}",
                    item.description,
                    door_state_line(&item.name, door.open, door.locked)
                );
                let data = item_data(accessor, &door_id);
                return HandlerResult::success(text).with_data(data);
            }
        }
    }

    if let Some(other_id) = find_actor_by_name(accessor, object, &actor_id) {
        let other = accessor.get_actor(&other_id).expect("actor was just found");
        return HandlerResult::success(other.description.clone())
            .with_data(NarrationData::for_entity(other.id.as_str(), other.llm_context()));
    }

    // universal surfaces exist as vocabulary only; accept them gracefully
    if object.forms().any(|form| UNIVERSAL_SURFACES.contains(&form)) {
        return HandlerResult::success(format!("Nothing remarkable about the {}.", object.word));
    }

    HandlerResult::failure(format!(
        "You don't see any {} here.",
        display_name(Some(object), adjective)
    ))
}

fn door_state_line(name: &str, open: bool, locked: bool) -> String {
    if locked {
        format!("The {name} is locked.")
    } else if open {
        format!("The {name} is open.")
    } else {
        format!("The {name} is closed.")
    }
}

/// List what the actor carries, with llm_context payloads for narration.
pub fn handle_inventory(accessor: &mut StateAccessor, action: &ParsedAction) -> HandlerResult {
    let (actor_id, _) = match actor_and_location(accessor, action) {
        Ok(pair) => pair,
        Err(failure) => return failure,
    };
    let actor = accessor.get_actor(&actor_id).expect("actor was just validated");
    if actor.inventory.is_empty() {
        return HandlerResult::success("You are not carrying anything.");
    }
    let mut names = Vec::new();
    let mut payloads = Vec::new();
    for item_id in &actor.inventory {
        if let Some(item) = accessor.get_item(item_id) {
            names.push(item.name.clone());
            payloads.push(item_payload(item));
        }
    }
    HandlerResult::success(format!("You are carrying: {}.", names.join(", "))).with_data(NarrationData {
        items: payloads,
        ..NarrationData::default()
    })
}
