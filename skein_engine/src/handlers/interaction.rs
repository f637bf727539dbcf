//! Interaction handlers: open, close, use, read, pull, push, climb.
//!
//! Open and close share one state-change core that serves both door items
//! and containers. `use X on Y` consults the target's configured
//! `item_use_reactions` through the dispatcher, falling back to the item's
//! own reactions and finally to a shrug.

use crate::accessor::StateAccessor;
use crate::action::{HandlerResult, ParsedAction, WordRef};
use crate::behavior::{BehaviorModule, EventContext, HandlerFn};
use crate::handlers::movement::{named_exit_direction, traverse_exit};
use crate::handlers::{actor_and_location, display_name, item_data, require_object};
use crate::search::{find_accessible_item, find_actor_by_name, find_door_with_adjective};
use crate::vocab::{NounDef, VerbDef, Vocabulary};

use skein_data::{ActorId, EntityRef, ItemId, Value};
use std::collections::BTreeMap;

pub fn module() -> BehaviorModule {
    BehaviorModule {
        path: "core.interaction",
        vocabulary: Vocabulary {
            verbs: vec![
                VerbDef::new("open").requires_object().fires("on_open"),
                VerbDef::new("close")
                    .with_synonyms(&["shut"])
                    .requires_object()
                    .fires("on_close")
                    .brief(),
                VerbDef::new("use").requires_object().fires("on_use"),
                VerbDef::new("read").requires_object().fires("on_read"),
                VerbDef::new("pull").with_synonyms(&["yank"]).requires_object().fires("on_pull"),
                VerbDef::new("push")
                    .with_synonyms(&["press", "shove"])
                    .requires_object()
                    .fires("on_push"),
                VerbDef::new("climb").with_synonyms(&["scale"]).requires_object().fires("on_climb"),
            ],
            adjectives: vec![NounDef::new("open")],
            ..Vocabulary::default()
        },
        handlers: vec![
            ("open", handle_open as HandlerFn),
            ("close", handle_close as HandlerFn),
            ("use", handle_use as HandlerFn),
            ("read", handle_read as HandlerFn),
            ("pull", handle_pull as HandlerFn),
            ("push", handle_push as HandlerFn),
            ("climb", handle_climb as HandlerFn),
        ],
        ..BehaviorModule::default()
    }
}

fn changes(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
}

/// Locate an openable target: smart door selection first when the player
/// just says "door", then the general accessible-item search.
fn find_openable(
    accessor: &StateAccessor,
    action: &ParsedAction,
    actor_id: &ActorId,
    verb: &str,
) -> Result<ItemId, HandlerResult> {
    let object = require_object(action, &format!("What do you want to {verb}?"))?;
    let adjective = action.adjective.as_deref();
    let location_id = accessor
        .get_actor(actor_id)
        .map(|a| a.location.clone())
        .unwrap_or_default();

    if let Some(door_id) = find_door_with_adjective(accessor, object, adjective, &location_id, actor_id, verb) {
        return Ok(door_id);
    }
    find_accessible_item(accessor, object, actor_id, adjective).ok_or_else(|| {
        HandlerResult::failure(format!(
            "You don't see any {} here.",
            display_name(Some(object), adjective)
        ))
    })
}

/// One core for open/close across doors and containers.
fn change_open_state(
    accessor: &mut StateAccessor,
    item_id: &ItemId,
    actor_id: &ActorId,
    open: bool,
    verb: &str,
) -> HandlerResult {
    let Some(item) = accessor.get_item(item_id) else {
        return HandlerResult::failure("Something is inconsistent here: that thing vanished.".to_string());
    };
    let name = item.name.clone();
    let state_word = if open { "open" } else { "closed" };

    let (currently_open, locked, facet) = if let Some(door) = &item.door {
        (door.open, door.locked, "door")
    } else if let Some(container) = &item.container {
        if container.is_surface {
            return HandlerResult::failure(format!("The {name} has nothing to {verb}."));
        }
        (container.open, container.locked, "container")
    } else {
        return HandlerResult::failure(format!("You can't {verb} the {name}."));
    };

    if currently_open == open {
        return HandlerResult::failure(format!("The {name} is already {state_word}."));
    }
    if open && locked {
        return HandlerResult::failure(format!("The {name} is locked."));
    }

    let path = format!("{facet}.open");
    let result = accessor.update(
        &EntityRef::Item(item_id.clone()),
        &changes(&[(path.as_str(), Value::Bool(open))]),
        Some(verb),
        Some(actor_id),
    );
    if !result.success {
        return HandlerResult::failure(
            result
                .message
                .unwrap_or_else(|| format!("The {name} won't budge.")),
        );
    }

    let mut reply = HandlerResult::success(format!("You {verb} the {name}."))
        .append(result.message.as_deref().unwrap_or(""));
    // opening a container reveals what's inside
    if open && facet == "container" {
        let contents: Vec<String> = accessor
            .get_items_in_container(item_id)
            .into_iter()
            .map(|inner| inner.name.clone())
            .collect();
        if !contents.is_empty() {
            reply = reply.with_beat(format!("Inside you see: {}.", contents.join(", ")));
        }
    }
    reply.with_data(item_data(accessor, item_id))
}

pub fn handle_open(accessor: &mut StateAccessor, action: &ParsedAction) -> HandlerResult {
    let (actor_id, _) = match actor_and_location(accessor, action) {
        Ok(pair) => pair,
        Err(failure) => return failure,
    };
    match find_openable(accessor, action, &actor_id, "open") {
        Ok(item_id) => change_open_state(accessor, &item_id, &actor_id, true, "open"),
        Err(failure) => failure,
    }
}

pub fn handle_close(accessor: &mut StateAccessor, action: &ParsedAction) -> HandlerResult {
    let (actor_id, _) = match actor_and_location(accessor, action) {
        Ok(pair) => pair,
        Err(failure) => return failure,
    };
    match find_openable(accessor, action, &actor_id, "close") {
        Ok(item_id) => change_open_state(accessor, &item_id, &actor_id, false, "close"),
        Err(failure) => failure,
    }
}

/// Generic single-object interaction: find the item, fire the verb's
/// event, compose the base message with any behavior feedback.
fn generic_interaction(
    accessor: &mut StateAccessor,
    action: &ParsedAction,
    required_property: Option<&str>,
    message: impl Fn(&skein_data::Item) -> String,
) -> HandlerResult {
    let (actor_id, _) = match actor_and_location(accessor, action) {
        Ok(pair) => pair,
        Err(failure) => return failure,
    };
    let object = match require_object(action, &format!("What do you want to {}?", action.verb)) {
        Ok(word) => word,
        Err(failure) => return failure,
    };
    let adjective = action.adjective.as_deref();

    let Some(item_id) = find_accessible_item(accessor, object, &actor_id, adjective) else {
        return HandlerResult::failure(format!(
            "You don't see any {} here.",
            display_name(Some(object), adjective)
        ));
    };
    let item = accessor.get_item(&item_id).expect("item was just found");
    if let Some(property) = required_property {
        if !item.prop_bool(property) {
            return HandlerResult::failure(format!("You can't {} the {}.", action.verb, item.name));
        }
    }
    let base = message(item);

    let result = accessor.update(
        &EntityRef::Item(item_id.clone()),
        &BTreeMap::new(),
        Some(&action.verb),
        Some(&actor_id),
    );
    if !result.success {
        return HandlerResult::failure(result.message.unwrap_or_else(|| "Nothing happens.".to_string()));
    }
    HandlerResult::success(base)
        .append(result.message.as_deref().unwrap_or(""))
        .with_data(item_data(accessor, &item_id))
}

/// `use X` alone is a generic interaction; `use X on Y` consults
/// item-use reactions on the target, then on the item itself.
pub fn handle_use(accessor: &mut StateAccessor, action: &ParsedAction) -> HandlerResult {
    if action.indirect_object.is_some() {
        return use_on_target(accessor, action);
    }
    generic_interaction(accessor, action, None, |item| format!("You use the {}.", item.name))
}

fn use_on_target(accessor: &mut StateAccessor, action: &ParsedAction) -> HandlerResult {
    let (actor_id, _) = match actor_and_location(accessor, action) {
        Ok(pair) => pair,
        Err(failure) => return failure,
    };
    let object = match require_object(action, "What do you want to use?") {
        Ok(word) => word,
        Err(failure) => return failure,
    };
    let target_word = action.indirect_object.as_ref().expect("checked by handle_use");
    let target_adj = action.indirect_adjective.as_deref();

    let Some(item_id) = find_accessible_item(accessor, object, &actor_id, action.adjective.as_deref()) else {
        return HandlerResult::failure(format!(
            "You don't see any {} here.",
            display_name(Some(object), action.adjective.as_deref())
        ));
    };
    let item_name = accessor.get_item(&item_id).map(|i| i.name.clone()).unwrap_or_default();

    // the target may be an item or an actor
    let target_ref: Option<(EntityRef, String)> =
        if let Some(target_item) = find_accessible_item(accessor, target_word, &actor_id, target_adj) {
            let name = accessor
                .get_item(&target_item)
                .map(|i| i.name.clone())
                .unwrap_or_default();
            Some((EntityRef::Item(target_item), name))
        } else if let Some(target_actor) = find_actor_by_name(accessor, target_word, &actor_id) {
            let name = accessor
                .get_actor(&target_actor)
                .map(|a| a.name.clone())
                .unwrap_or_default();
            Some((EntityRef::Actor(target_actor), name))
        } else {
            None
        };
    let Some((target, target_name)) = target_ref else {
        return HandlerResult::failure(format!(
            "You don't see any {} here.",
            display_name(Some(target_word), target_adj)
        ));
    };

    let context = EventContext {
        actor_id: Some(actor_id.clone()),
        ..EventContext::default()
    }
    .with_extra("used_item", item_id.as_str())
    .with_extra("target", target.id_str());

    // target's configured reactions first, then the item's self-reactions
    let reaction = accessor.invoke_behavior(&target, "on_item_used", &context);
    if let Some(feedback) = reaction.feedback {
        return if reaction.allow {
            HandlerResult::success(feedback).with_data(item_data(accessor, &item_id))
        } else {
            HandlerResult::failure(feedback)
        };
    }
    let self_reaction = accessor.invoke_behavior(&EntityRef::Item(item_id.clone()), "on_item_used", &context);
    if let Some(feedback) = self_reaction.feedback {
        return if self_reaction.allow {
            HandlerResult::success(feedback).with_data(item_data(accessor, &item_id))
        } else {
            HandlerResult::failure(feedback)
        };
    }

    HandlerResult::success(format!(
        "You use the {item_name} on the {target_name}. Nothing special happens."
    ))
}

pub fn handle_read(accessor: &mut StateAccessor, action: &ParsedAction) -> HandlerResult {
    generic_interaction(accessor, action, Some("readable"), |item| {
        match item.prop_str("text") {
            Some(text) => format!("You read the {}: {text}", item.name),
            None => format!("You read the {}.", item.name),
        }
    })
}

pub fn handle_pull(accessor: &mut StateAccessor, action: &ParsedAction) -> HandlerResult {
    generic_interaction(accessor, action, None, |item| format!("You pull the {}.", item.name))
}

pub fn handle_push(accessor: &mut StateAccessor, action: &ParsedAction) -> HandlerResult {
    generic_interaction(accessor, action, None, |item| format!("You push the {}.", item.name))
}

/// Two-layer climb: a named exit wins (climb is then movement), otherwise
/// a climbable item sets posture and focus.
pub fn handle_climb(accessor: &mut StateAccessor, action: &ParsedAction) -> HandlerResult {
    let (actor_id, location_id) = match actor_and_location(accessor, action) {
        Ok(pair) => pair,
        Err(failure) => return failure,
    };
    let object = match require_object(action, "What do you want to climb?") {
        Ok(word) => word,
        Err(failure) => return failure,
    };

    if let Some(direction) = named_exit_direction(accessor, &location_id, object) {
        return traverse_exit(accessor, &actor_id, &location_id, &direction);
    }

    let adjective = action.adjective.as_deref();
    let Some(item_id) = find_accessible_item(accessor, object, &actor_id, adjective) else {
        return HandlerResult::failure(format!(
            "You don't see any {} here.",
            display_name(Some(object), adjective)
        ));
    };
    let item = accessor.get_item(&item_id).expect("item was just found");
    let item_name = item.name.clone();
    if !item.prop_bool("climbable") {
        return HandlerResult::failure(format!("You can't climb the {item_name}."));
    }

    let result = accessor.update(
        &EntityRef::Actor(actor_id.clone()),
        &changes(&[
            ("posture", Value::from("climbing")),
            ("focused_on", Value::from(item_id.as_str())),
        ]),
        Some("climb"),
        Some(&actor_id),
    );
    if !result.success {
        return HandlerResult::failure(result.message.unwrap_or_default());
    }
    let mut reply = HandlerResult::success(format!("You climb the {item_name}."))
        .append(result.message.as_deref().unwrap_or(""));
    reply.data = Some(crate::action::NarrationData {
        id: Some(item_id.0.clone()),
        posture: Some("climbing".to_string()),
        ..crate::action::NarrationData::default()
    });
    reply
}
