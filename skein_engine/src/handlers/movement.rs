//! Movement: the `go` handler and the exit traversal core.
//!
//! `traverse_exit` owns the door matrix — open doors pass, closed doors
//! demand opening, locked doors check keys and the lock's `auto_unlock`
//! flag — and is shared with `climb` (named exits) and NPC flight. After a
//! successful move the destination is auto-looked into the narration, and
//! first meetings with NPCs there fire the encounter dispatcher.

use crate::accessor::StateAccessor;
use crate::action::{HandlerResult, NarrationData, ParsedAction, WordRef};
use crate::behavior::{BehaviorModule, EventContext, HandlerFn};
use crate::handlers::perception::describe_location;
use crate::handlers::{actor_and_location, display_name};
use crate::search::{actor_has_key, find_exit_by_name};
use crate::vocab::{VerbDef, Vocabulary};

use log::info;
use skein_data::{ActorId, EntityRef, ExitDef, LocationId, Value};
use std::collections::BTreeMap;

const DIRECTIONS: &[&str] = &[
    "north",
    "south",
    "east",
    "west",
    "northeast",
    "northwest",
    "southeast",
    "southwest",
    "up",
    "down",
];

pub fn module() -> BehaviorModule {
    BehaviorModule {
        path: "core.movement",
        vocabulary: Vocabulary {
            verbs: vec![VerbDef::new("go").with_synonyms(&["move", "walk", "head", "run"])],
            directions: DIRECTIONS.iter().map(|d| (*d).to_string()).collect(),
            ..Vocabulary::default()
        },
        handlers: vec![("go", handle_go as HandlerFn)],
        ..BehaviorModule::default()
    }
}

/// Move the acting actor through an exit named by direction or by name.
pub fn handle_go(accessor: &mut StateAccessor, action: &ParsedAction) -> HandlerResult {
    let (actor_id, location_id) = match actor_and_location(accessor, action) {
        Ok(pair) => pair,
        Err(failure) => return failure,
    };

    let direction = match resolve_direction(accessor, action, &location_id) {
        Some(direction) => direction,
        None => {
            let asked = action
                .direction
                .clone()
                .unwrap_or_else(|| display_name(action.object.as_ref(), None));
            return HandlerResult::failure(format!("You can't go {asked} from here."));
        },
    };

    traverse_exit(accessor, &actor_id, &location_id, &direction)
}

fn resolve_direction(accessor: &StateAccessor, action: &ParsedAction, location_id: &LocationId) -> Option<String> {
    let location = accessor.get_location(location_id)?;
    if let Some(direction) = &action.direction {
        if location.has_exit(direction) {
            return Some(direction.clone());
        }
        return None;
    }
    let word = action.object.as_ref()?;
    find_exit_by_name(location, word).map(|(direction, _)| direction.to_string())
}

/// The shared movement core: door checks, the actual relocation, the
/// auto-look, and first-meeting reactions.
pub fn traverse_exit(
    accessor: &mut StateAccessor,
    actor_id: &ActorId,
    location_id: &LocationId,
    direction: &str,
) -> HandlerResult {
    let Some(exit) = accessor
        .get_location(location_id)
        .and_then(|location| location.resolve_exit(direction))
        .cloned()
    else {
        return HandlerResult::failure(format!("You can't go {direction} from here."));
    };

    if let Some(failure) = check_exit_conditions(accessor, &exit) {
        return failure;
    }

    let mut unlock_note: Option<String> = None;
    if let Some(door_id) = &exit.door_id {
        let Some(door_item) = accessor.get_item(door_id) else {
            return HandlerResult::failure("Something is inconsistent here: that doorway is missing its door.");
        };
        let door_name = door_item.name.clone();
        let door = door_item.door.clone().unwrap_or_default();

        if !door.open {
            if !door.locked {
                return HandlerResult::failure(format!(
                    "The {door_name} is closed. You need to open it first."
                ));
            }
            let keyed = door
                .lock_id
                .as_ref()
                .is_some_and(|lock| actor_has_key(accessor, actor_id, lock));
            if !keyed {
                let fail = door
                    .lock_id
                    .as_ref()
                    .and_then(|lock| accessor.get_lock(lock))
                    .map(|lock| lock.fail_message.clone())
                    .filter(|msg| !msg.is_empty());
                return HandlerResult::failure(
                    fail.unwrap_or_else(|| format!("The {door_name} is locked. You need a key.")),
                );
            }
            let auto_unlock = door
                .lock_id
                .as_ref()
                .and_then(|lock| accessor.get_lock(lock))
                .is_some_and(|lock| lock.auto_unlock);
            if !auto_unlock {
                return HandlerResult::failure(format!(
                    "The {door_name} is locked. You have the key, but you need to unlock it first."
                ));
            }
            // key in hand and the lock yields on its own
            let mut changes = BTreeMap::new();
            changes.insert("door.locked".to_string(), Value::Bool(false));
            changes.insert("door.open".to_string(), Value::Bool(true));
            let result = accessor.update(&EntityRef::Item(door_id.clone()), &changes, None, None);
            if !result.success {
                return HandlerResult::failure(result.message.unwrap_or_default());
            }
            unlock_note = Some(format!("You unlock the {door_name} with your key and pass through."));
        }
    }

    let Some(destination) = exit.to.clone() else {
        return HandlerResult::failure(format!("The way {direction} leads nowhere."));
    };

    let mut changes = BTreeMap::new();
    changes.insert("location".to_string(), Value::from(destination.as_str()));
    let result = accessor.update(&EntityRef::Actor(actor_id.clone()), &changes, None, None);
    if !result.success {
        return HandlerResult::failure(result.message.unwrap_or_default());
    }
    info!("'{actor_id}' moved {direction} from '{location_id}' to '{destination}'");

    let meeting_beats = first_meetings(accessor, actor_id, &destination);

    // auto-look: movement narration always includes the destination
    let (look_text, payloads) = describe_location(accessor, &destination, actor_id);
    let primary = unlock_note.unwrap_or_else(|| format!("You go {direction}."));
    let mut result = HandlerResult::success(format!("{primary}\n{look_text}")).with_data(NarrationData {
        id: Some(destination.0.clone()),
        items: payloads,
        ..NarrationData::default()
    });
    for beat in meeting_beats {
        result = result.with_beat(beat);
    }
    result
}

/// Exit conditions are global-flag gates; `on_fail` supplies the refusal.
fn check_exit_conditions(accessor: &StateAccessor, exit: &ExitDef) -> Option<HandlerResult> {
    for condition in &exit.conditions {
        if !accessor.state.flag_set(condition) {
            let message = exit
                .on_fail
                .clone()
                .unwrap_or_else(|| "Something bars the way.".to_string());
            return Some(HandlerResult::failure(message));
        }
    }
    None
}

/// Fire `on_first_meeting` for NPCs the mover has never met at the
/// destination. Met-flags live in `extra` so they survive saves.
fn first_meetings(accessor: &mut StateAccessor, mover: &ActorId, destination: &LocationId) -> Vec<String> {
    let unmet: Vec<ActorId> = accessor
        .state
        .actors_in_location(destination)
        .into_iter()
        .filter(|actor| &actor.id != mover && !actor.prop_bool("dead"))
        .map(|actor| actor.id.clone())
        .filter(|id| {
            let flag = meeting_flag(id, mover);
            !accessor.state.flag_set(&flag)
        })
        .collect();

    let mut feedback = Vec::new();
    for npc_id in unmet {
        accessor.state.set_flag(&meeting_flag(&npc_id, mover), Value::Bool(true));
        let context = EventContext {
            actor_id: Some(mover.clone()),
            ..EventContext::default()
        }
        .with_extra("met_actor", npc_id.as_str());
        let result = accessor.invoke_behavior(&EntityRef::Actor(npc_id), "on_first_meeting", &context);
        if let Some(msg) = result.feedback {
            feedback.push(msg);
        }
    }
    feedback
}

fn meeting_flag(npc: &ActorId, mover: &ActorId) -> String {
    format!("met_{npc}_{mover}")
}

/// Resolve a direction for `climb <exit name>` style commands.
pub fn named_exit_direction(accessor: &StateAccessor, location_id: &LocationId, word: &WordRef) -> Option<String> {
    let location = accessor.get_location(location_id)?;
    find_exit_by_name(location, word).map(|(direction, _)| direction.to_string())
}
