//! Lock handlers: unlock and lock.
//!
//! Doors and containers share one lock model: the facet names a lock, the
//! lock lists its keys, and the actor must carry one. Locking additionally
//! requires the target to be closed. Bare "door" goes through smart door
//! selection, so "unlock door" picks the door your key actually fits.

use crate::accessor::StateAccessor;
use crate::action::{HandlerResult, ParsedAction};
use crate::behavior::{BehaviorModule, HandlerFn};
use crate::handlers::{actor_and_location, display_name, item_data, require_object};
use crate::search::{actor_has_key, find_accessible_item, find_door_with_adjective};
use crate::vocab::{VerbDef, Vocabulary};

use skein_data::{ActorId, EntityRef, ItemId, LockId, Value};
use std::collections::BTreeMap;

pub fn module() -> BehaviorModule {
    BehaviorModule {
        path: "core.locks",
        vocabulary: Vocabulary {
            verbs: vec![
                VerbDef::new("unlock").requires_object().fires("on_unlock"),
                VerbDef::new("lock").requires_object().fires("on_lock"),
            ],
            ..Vocabulary::default()
        },
        handlers: vec![
            ("unlock", handle_unlock as HandlerFn),
            ("lock", handle_lock as HandlerFn),
        ],
        ..BehaviorModule::default()
    }
}

/// What the lock machinery needs to know about a target, whichever facet
/// carries the lock.
struct LockTarget {
    item_id: ItemId,
    name: String,
    facet: &'static str,
    open: bool,
    locked: bool,
    lock_id: Option<LockId>,
}

fn resolve_target(
    accessor: &StateAccessor,
    action: &ParsedAction,
    actor_id: &ActorId,
    verb: &str,
) -> Result<LockTarget, HandlerResult> {
    let object = require_object(action, &format!("What do you want to {verb}?"))?;
    let adjective = action.adjective.as_deref();
    let location_id = accessor
        .get_actor(actor_id)
        .map(|a| a.location.clone())
        .unwrap_or_default();

    let item_id = find_door_with_adjective(accessor, object, adjective, &location_id, actor_id, verb)
        .or_else(|| find_accessible_item(accessor, object, actor_id, adjective))
        .ok_or_else(|| {
            HandlerResult::failure(format!(
                "You don't see any {} here.",
                display_name(Some(object), adjective)
            ))
        })?;

    let item = accessor.get_item(&item_id).expect("target was just found");
    if let Some(door) = &item.door {
        return Ok(LockTarget {
            item_id: item_id.clone(),
            name: item.name.clone(),
            facet: "door",
            open: door.open,
            locked: door.locked,
            lock_id: door.lock_id.clone(),
        });
    }
    if let Some(container) = &item.container {
        return Ok(LockTarget {
            item_id: item_id.clone(),
            name: item.name.clone(),
            facet: "container",
            open: container.open,
            locked: container.locked,
            lock_id: container.lock_id.clone(),
        });
    }
    Err(HandlerResult::failure(format!("The {} has no lock.", item.name)))
}

fn require_key(accessor: &StateAccessor, target: &LockTarget, actor_id: &ActorId, verb: &str) -> Option<HandlerResult> {
    let lock_id = target.lock_id.as_ref()?;
    if accessor.get_lock(lock_id).is_none() {
        return Some(HandlerResult::failure(format!(
            "Something is inconsistent here: the {} names a missing lock.",
            target.name
        )));
    }
    if !actor_has_key(accessor, actor_id, lock_id) {
        let fail = accessor
            .get_lock(lock_id)
            .map(|lock| lock.fail_message.clone())
            .filter(|msg| !msg.is_empty());
        return Some(HandlerResult::failure(fail.unwrap_or_else(|| {
            format!("You don't have the right key to {verb} the {}.", target.name)
        })));
    }
    None
}

pub fn handle_unlock(accessor: &mut StateAccessor, action: &ParsedAction) -> HandlerResult {
    let (actor_id, _) = match actor_and_location(accessor, action) {
        Ok(pair) => pair,
        Err(failure) => return failure,
    };
    let target = match resolve_target(accessor, action, &actor_id, "unlock") {
        Ok(target) => target,
        Err(failure) => return failure,
    };

    if !target.locked {
        return HandlerResult::success(format!("The {} is already unlocked.", target.name));
    }
    if target.lock_id.is_none() {
        return HandlerResult::failure(format!("The {} has no lock.", target.name));
    }
    if let Some(failure) = require_key(accessor, &target, &actor_id, "unlock") {
        return failure;
    }

    let path = format!("{}.locked", target.facet);
    let mut changes = BTreeMap::new();
    changes.insert(path, Value::Bool(false));
    let result = accessor.update(&EntityRef::Item(target.item_id.clone()), &changes, Some("unlock"), Some(&actor_id));
    if !result.success {
        return HandlerResult::failure(result.message.unwrap_or_default());
    }
    HandlerResult::success(format!("You unlock the {}.", target.name))
        .append(result.message.as_deref().unwrap_or(""))
        .with_data(item_data(accessor, &target.item_id))
}

pub fn handle_lock(accessor: &mut StateAccessor, action: &ParsedAction) -> HandlerResult {
    let (actor_id, _) = match actor_and_location(accessor, action) {
        Ok(pair) => pair,
        Err(failure) => return failure,
    };
    let target = match resolve_target(accessor, action, &actor_id, "lock") {
        Ok(target) => target,
        Err(failure) => return failure,
    };

    if target.open {
        return HandlerResult::failure(format!("You must close the {} first.", target.name));
    }
    if target.locked {
        return HandlerResult::success(format!("The {} is already locked.", target.name));
    }
    if target.lock_id.is_none() {
        return HandlerResult::failure(format!("The {} has no lock.", target.name));
    }
    if let Some(failure) = require_key(accessor, &target, &actor_id, "lock") {
        return failure;
    }

    let path = format!("{}.locked", target.facet);
    let mut changes = BTreeMap::new();
    changes.insert(path, Value::Bool(true));
    let result = accessor.update(&EntityRef::Item(target.item_id.clone()), &changes, Some("lock"), Some(&actor_id));
    if !result.success {
        return HandlerResult::failure(result.message.unwrap_or_default());
    }
    HandlerResult::success(format!("You lock the {}.", target.name))
        .append(result.message.as_deref().unwrap_or(""))
        .with_data(item_data(accessor, &target.item_id))
}
