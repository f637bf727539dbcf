//! Manipulation handlers: take, drop, give, put.
//!
//! These four move items between locations, containers, and inventories.
//! All of them route their mutations through the accessor so per-entity
//! behaviors (`on_take`, `on_drop`, `on_put`) get their say, and all of
//! them roll their first mutation back if the second one fails.

use crate::accessor::StateAccessor;
use crate::action::{HandlerResult, ParsedAction};
use crate::behavior::{BehaviorModule, EventContext, HandlerFn};
use crate::handlers::{actor_and_location, display_name, item_data, require_object};
use crate::search::{
    find_accessible_item, find_actor_by_name, find_container_with_adjective, find_item_in_container,
    find_item_in_inventory, name_matches,
};
use crate::vocab::{VerbDef, Vocabulary};

use skein_data::{EntityRef, Value};
use std::collections::BTreeMap;

/// Module manifest: vocabulary plus handler registrations.
pub fn module() -> BehaviorModule {
    BehaviorModule {
        path: "core.manipulation",
        vocabulary: Vocabulary {
            verbs: vec![
                VerbDef::new("take")
                    .with_synonyms(&["get", "grab", "pick"])
                    .requires_object()
                    .fires("on_take"),
                VerbDef::new("drop").requires_object().fires("on_drop").brief(),
                VerbDef::new("give")
                    .with_synonyms(&["hand", "offer"])
                    .requires_object()
                    .fires("on_give"),
                VerbDef::new("put")
                    .with_synonyms(&["place", "set"])
                    .requires_object()
                    .fires("on_put")
                    .falls_back_to("on_drop")
                    .brief(),
            ],
            prepositions: vec!["from".into(), "in".into(), "on".into(), "into".into(), "to".into()],
            ..Vocabulary::default()
        },
        handlers: vec![
            ("take", handle_take as HandlerFn),
            ("drop", handle_drop as HandlerFn),
            ("give", handle_give as HandlerFn),
            ("put", handle_put as HandlerFn),
        ],
        ..BehaviorModule::default()
    }
}

fn changes(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
}

/// Pick up an item from the actor's surroundings, optionally restricted to
/// a named container ("take coin from chest").
pub fn handle_take(accessor: &mut StateAccessor, action: &ParsedAction) -> HandlerResult {
    let (actor_id, location_id) = match actor_and_location(accessor, action) {
        Ok(pair) => pair,
        Err(failure) => return failure,
    };
    let object = match require_object(action, "What do you want to take?") {
        Ok(word) => word,
        Err(failure) => return failure,
    };
    let adjective = action.adjective.as_deref();

    let item_id = if let Some(container_word) = &action.indirect_object {
        // restricted search: the named thing must exist, be a container,
        // and be open unless it is a surface
        let container_adj = action.indirect_adjective.as_deref();
        let Some(container_id) = find_container_with_adjective(accessor, container_word, container_adj, &location_id)
        else {
            for item in accessor.get_items_in_location(&location_id) {
                if name_matches(container_word, &item.name) {
                    return HandlerResult::failure(format!("The {} is not a container.", item.name));
                }
            }
            return HandlerResult::failure(format!(
                "You don't see any {} here.",
                display_name(Some(container_word), container_adj)
            ));
        };
        let container = accessor.get_item(&container_id).expect("container was just found");
        let container_name = container.name.clone();
        let info = container.container.clone().unwrap_or_default();
        if !info.is_surface && !info.open {
            return HandlerResult::failure(format!("The {container_name} is closed."));
        }
        let Some(found) = find_item_in_container(accessor, object, &container_id, adjective) else {
            let preposition = if info.is_surface { "on" } else { "in" };
            return HandlerResult::failure(format!(
                "You don't see any {} {preposition} the {container_name}.",
                display_name(Some(object), adjective)
            ));
        };
        found
    } else {
        match find_accessible_item(accessor, object, &actor_id, adjective) {
            Some(found) => found,
            None => {
                return HandlerResult::failure(format!(
                    "You don't see any {} here.",
                    display_name(Some(object), adjective)
                ));
            },
        }
    };

    let item = accessor.get_item(&item_id).expect("item was just found");
    let item_name = item.name.clone();
    let previous_location = item.location.clone();
    if item.location == actor_id.as_str() {
        return HandlerResult::success(format!("You already have the {item_name}."));
    }
    if !item.portable {
        return HandlerResult::failure(format!("You can't take the {item_name}."));
    }

    let entity = EntityRef::Item(item_id.clone());
    let result = accessor.update(
        &entity,
        &changes(&[
            ("location", Value::from(actor_id.as_str())),
            ("states.equipped", Value::Bool(false)),
        ]),
        Some("take"),
        Some(&actor_id),
    );
    if !result.success {
        return HandlerResult::failure(result.message.unwrap_or_else(|| format!("You can't take the {item_name}.")));
    }

    let inventory_result = accessor.update(
        &EntityRef::Actor(actor_id.clone()),
        &changes(&[("+inventory", Value::from(item_id.as_str()))]),
        None,
        None,
    );
    if !inventory_result.success {
        // roll the location change back before reporting the bug
        accessor.update(
            &entity,
            &changes(&[("location", Value::from(previous_location.as_str()))]),
            None,
            None,
        );
        return HandlerResult::failure(format!(
            "Something is inconsistent here: {}",
            inventory_result.message.unwrap_or_default()
        ));
    }

    let data = item_data(accessor, &item_id);
    HandlerResult::success(format!("You take the {item_name}."))
        .append(result.message.as_deref().unwrap_or(""))
        .with_data(data)
}

/// Put a carried item down in the current location.
pub fn handle_drop(accessor: &mut StateAccessor, action: &ParsedAction) -> HandlerResult {
    let (actor_id, location_id) = match actor_and_location(accessor, action) {
        Ok(pair) => pair,
        Err(failure) => return failure,
    };
    let object = match require_object(action, "What do you want to drop?") {
        Ok(word) => word,
        Err(failure) => return failure,
    };

    let Some(item_id) = find_item_in_inventory(accessor, object, &actor_id) else {
        return HandlerResult::failure(format!("You don't have any {}.", display_name(Some(object), None)));
    };
    let item_name = accessor.get_item(&item_id).map(|i| i.name.clone()).unwrap_or_default();

    let entity = EntityRef::Item(item_id.clone());
    let result = accessor.update(
        &entity,
        &changes(&[
            ("location", Value::from(location_id.as_str())),
            ("states.equipped", Value::Bool(false)),
        ]),
        Some("drop"),
        Some(&actor_id),
    );
    if !result.success {
        return HandlerResult::failure(result.message.unwrap_or_else(|| format!("You keep hold of the {item_name}.")));
    }

    let inventory_result = accessor.update(
        &EntityRef::Actor(actor_id.clone()),
        &changes(&[("-inventory", Value::from(item_id.as_str()))]),
        None,
        None,
    );
    if !inventory_result.success {
        accessor.update(
            &entity,
            &changes(&[("location", Value::from(actor_id.as_str()))]),
            None,
            None,
        );
        return HandlerResult::failure(format!(
            "Something is inconsistent here: {}",
            inventory_result.message.unwrap_or_default()
        ));
    }

    let data = item_data(accessor, &item_id);
    HandlerResult::success(format!("You drop the {item_name}."))
        .append(result.message.as_deref().unwrap_or(""))
        .with_data(data)
}

/// Hand a carried item to another actor in the same location. The
/// recipient's `on_receive_item` and `on_gift_given` chains run after the
/// transfer, driving trades and gift reactions.
pub fn handle_give(accessor: &mut StateAccessor, action: &ParsedAction) -> HandlerResult {
    let (actor_id, _) = match actor_and_location(accessor, action) {
        Ok(pair) => pair,
        Err(failure) => return failure,
    };
    let object = match require_object(action, "What do you want to give?") {
        Ok(word) => word,
        Err(failure) => return failure,
    };
    let Some(recipient_word) = action.indirect_object.as_ref() else {
        return HandlerResult::failure("Give it to whom?".to_string());
    };

    let Some(item_id) = find_item_in_inventory(accessor, object, &actor_id) else {
        return HandlerResult::failure(format!("You don't have any {}.", display_name(Some(object), None)));
    };
    let Some(recipient_id) = find_actor_by_name(accessor, recipient_word, &actor_id) else {
        return HandlerResult::failure(format!(
            "You don't see any {} here.",
            display_name(Some(recipient_word), action.indirect_adjective.as_deref())
        ));
    };
    let item_name = accessor.get_item(&item_id).map(|i| i.name.clone()).unwrap_or_default();
    let recipient_name = accessor
        .get_actor(&recipient_id)
        .map(|a| a.name.clone())
        .unwrap_or_default();

    let entity = EntityRef::Item(item_id.clone());
    let result = accessor.update(
        &entity,
        &changes(&[
            ("location", Value::from(recipient_id.as_str())),
            ("states.equipped", Value::Bool(false)),
        ]),
        None,
        None,
    );
    if !result.success {
        return HandlerResult::failure(result.message.unwrap_or_else(|| format!("You keep hold of the {item_name}.")));
    }

    let remove_result = accessor.update(
        &EntityRef::Actor(actor_id.clone()),
        &changes(&[("-inventory", Value::from(item_id.as_str()))]),
        None,
        None,
    );
    if !remove_result.success {
        accessor.update(
            &entity,
            &changes(&[("location", Value::from(actor_id.as_str()))]),
            None,
            None,
        );
        return HandlerResult::failure(format!(
            "Something is inconsistent here: {}",
            remove_result.message.unwrap_or_default()
        ));
    }
    let add_result = accessor.update(
        &EntityRef::Actor(recipient_id.clone()),
        &changes(&[("+inventory", Value::from(item_id.as_str()))]),
        None,
        None,
    );
    if !add_result.success {
        accessor.update(
            &EntityRef::Actor(actor_id.clone()),
            &changes(&[("+inventory", Value::from(item_id.as_str()))]),
            None,
            None,
        );
        accessor.update(
            &entity,
            &changes(&[("location", Value::from(actor_id.as_str()))]),
            None,
            None,
        );
        return HandlerResult::failure(format!(
            "Something is inconsistent here: {}",
            add_result.message.unwrap_or_default()
        ));
    }

    // the recipient reacts: trades first, then gift reactions
    let recipient_ref = EntityRef::Actor(recipient_id.clone());
    let context = EventContext {
        actor_id: Some(actor_id.clone()),
        ..EventContext::default()
    }
    .with_extra("item_id", item_id.as_str())
    .with_extra("giver_id", actor_id.as_str());

    let mut message = format!("You give the {item_name} to {recipient_name}.");
    let receive = accessor.invoke_behavior(&recipient_ref, "on_receive_item", &context);
    if let Some(feedback) = receive.feedback {
        message = format!("{message}\n{feedback}");
    }
    let gift = accessor.invoke_behavior(&recipient_ref, "on_gift_given", &context);
    if let Some(feedback) = gift.feedback {
        message = format!("{message}\n{feedback}");
    }

    let data = item_data(accessor, &item_id);
    HandlerResult::success(message).with_data(data)
}

/// Put a carried item in (or on) a container in the current location.
pub fn handle_put(accessor: &mut StateAccessor, action: &ParsedAction) -> HandlerResult {
    let (actor_id, location_id) = match actor_and_location(accessor, action) {
        Ok(pair) => pair,
        Err(failure) => return failure,
    };
    let object = match require_object(action, "What do you want to put down?") {
        Ok(word) => word,
        Err(failure) => return failure,
    };
    let Some(container_word) = action.indirect_object.as_ref() else {
        return HandlerResult::failure("Put it where?".to_string());
    };

    let Some(item_id) = find_item_in_inventory(accessor, object, &actor_id) else {
        return HandlerResult::failure(format!("You don't have the {}.", display_name(Some(object), None)));
    };

    // the named target must exist here and actually be a container
    let target = accessor
        .get_items_in_location(&location_id)
        .into_iter()
        .find(|item| name_matches(container_word, &item.name))
        .map(|item| (item.id.clone(), item.name.clone(), item.container.clone()));
    let Some((container_id, container_name, container_info)) = target else {
        return HandlerResult::failure(format!(
            "You don't see any {} here.",
            display_name(Some(container_word), action.indirect_adjective.as_deref())
        ));
    };
    let Some(info) = container_info else {
        return HandlerResult::failure(format!("You can't put things in the {container_name}."));
    };
    if !info.is_surface && !info.open {
        return HandlerResult::failure(format!("The {container_name} is closed."));
    }
    if info.capacity > 0 && accessor.get_items_in_container(&container_id).len() >= info.capacity {
        return HandlerResult::failure(format!("The {container_name} is full."));
    }

    let item_name = accessor.get_item(&item_id).map(|i| i.name.clone()).unwrap_or_default();
    let entity = EntityRef::Item(item_id.clone());
    let result = accessor.update(
        &entity,
        &changes(&[("location", Value::from(container_id.as_str()))]),
        Some("put"),
        Some(&actor_id),
    );
    if !result.success {
        return HandlerResult::failure(
            result
                .message
                .unwrap_or_else(|| format!("You can't put the {item_name} there.")),
        );
    }

    let inventory_result = accessor.update(
        &EntityRef::Actor(actor_id.clone()),
        &changes(&[("-inventory", Value::from(item_id.as_str()))]),
        None,
        None,
    );
    if !inventory_result.success {
        accessor.update(
            &entity,
            &changes(&[("location", Value::from(actor_id.as_str()))]),
            None,
            None,
        );
        return HandlerResult::failure(format!(
            "Something is inconsistent here: {}",
            inventory_result.message.unwrap_or_default()
        ));
    }

    let preposition = if info.is_surface { "on" } else { "in" };
    let data = item_data(accessor, &item_id);
    HandlerResult::success(format!("You put the {item_name} {preposition} the {container_name}."))
        .append(result.message.as_deref().unwrap_or(""))
        .with_data(data)
}
