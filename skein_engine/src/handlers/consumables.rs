//! Consumable handlers: eat and drink.
//!
//! Both verbs gate on a property (`edible` / `drinkable`), fire their
//! event so behaviors can veto or add effects (the core consumables
//! behavior handles healing and need satisfaction), then consume the item:
//! out of the inventory, location cleared rather than deleted so dangling
//! references stay detectable.

use crate::accessor::StateAccessor;
use crate::action::{HandlerResult, ParsedAction};
use crate::behavior::{BehaviorModule, HandlerFn};
use crate::handlers::{actor_and_location, display_name, item_data, require_object};
use crate::search::{find_accessible_item, find_item_in_inventory};
use crate::vocab::{VerbDef, Vocabulary};

use skein_data::{EntityRef, Value};
use std::collections::BTreeMap;

pub fn module() -> BehaviorModule {
    BehaviorModule {
        path: "core.consumable_verbs",
        vocabulary: Vocabulary {
            verbs: vec![
                VerbDef::new("eat").with_synonyms(&["devour"]).requires_object().fires("on_eat"),
                VerbDef::new("drink")
                    .with_synonyms(&["quaff", "sip"])
                    .requires_object()
                    .fires("on_drink"),
            ],
            ..Vocabulary::default()
        },
        handlers: vec![
            ("eat", handle_eat as HandlerFn),
            ("drink", handle_drink as HandlerFn),
        ],
        ..BehaviorModule::default()
    }
}

fn consume(
    accessor: &mut StateAccessor,
    action: &ParsedAction,
    required_property: &str,
    past_tense: &str,
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

    let Some(item_id) = find_item_in_inventory(accessor, object, &actor_id)
        .or_else(|| find_accessible_item(accessor, object, &actor_id, adjective))
    else {
        return HandlerResult::failure(format!(
            "You don't see any {} here.",
            display_name(Some(object), adjective)
        ));
    };
    let item = accessor.get_item(&item_id).expect("item was just found");
    let item_name = item.name.clone();
    if !item.prop_bool(required_property) {
        return HandlerResult::failure(format!("You can't {} the {item_name}.", action.verb));
    }
    let data = item_data(accessor, &item_id);

    // the move to "" marks the item consumed; behaviors fire first and may
    // veto the whole thing
    let mut changes = BTreeMap::new();
    changes.insert("location".to_string(), Value::from(""));
    let result = accessor.update(&EntityRef::Item(item_id.clone()), &changes, Some(&action.verb), Some(&actor_id));
    if !result.success {
        return HandlerResult::failure(
            result
                .message
                .unwrap_or_else(|| "You decide against it.".to_string()),
        );
    }

    let carried = accessor
        .get_actor(&actor_id)
        .is_some_and(|actor| actor.inventory.contains(&item_id));
    if carried {
        let mut removal = BTreeMap::new();
        removal.insert("-inventory".to_string(), Value::from(item_id.as_str()));
        let removed = accessor.update(&EntityRef::Actor(actor_id.clone()), &removal, None, None);
        if !removed.success {
            return HandlerResult::failure(format!(
                "Something is inconsistent here: {}",
                removed.message.unwrap_or_default()
            ));
        }
    }

    HandlerResult::success(format!("You {past_tense} the {item_name}."))
        .append(result.message.as_deref().unwrap_or(""))
        .with_data(data)
}

pub fn handle_eat(accessor: &mut StateAccessor, action: &ParsedAction) -> HandlerResult {
    consume(accessor, action, "edible", "eat")
}

pub fn handle_drink(accessor: &mut StateAccessor, action: &ParsedAction) -> HandlerResult {
    consume(accessor, action, "drinkable", "drink")
}
