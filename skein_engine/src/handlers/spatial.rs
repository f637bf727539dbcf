//! Spatial positioning within a location: approach, cover, hide, up, down.
//!
//! These verbs move an actor relative to things rather than between
//! locations. The shared core finds an accessible target, optionally
//! requires a property (`provides_cover`, `allows_concealment`), and sets
//! the actor's `posture` and `focused_on`. `up` and `down` first unwind an
//! existing posture; with nothing to unwind they defer to movement.

use crate::accessor::StateAccessor;
use crate::action::{HandlerResult, NarrationData, ParsedAction};
use crate::behavior::{BehaviorModule, HandlerFn};
use crate::handlers::movement::traverse_exit;
use crate::handlers::{actor_and_location, display_name, require_object};
use crate::search::{find_accessible_item, find_actor_by_name};
use crate::vocab::{VerbDef, Vocabulary};

use skein_data::{EntityRef, Value};
use std::collections::BTreeMap;

pub fn module() -> BehaviorModule {
    BehaviorModule {
        path: "core.spatial",
        vocabulary: Vocabulary {
            verbs: vec![
                VerbDef::new("approach").with_synonyms(&["near"]).requires_object(),
                VerbDef::new("cover").with_synonyms(&["shelter"]).requires_object(),
                VerbDef::new("hide").with_synonyms(&["conceal"]).requires_object(),
                VerbDef::new("up").brief(),
                VerbDef::new("down").with_synonyms(&["dismount"]).brief(),
            ],
            prepositions: vec!["behind".into(), "under".into()],
            ..Vocabulary::default()
        },
        handlers: vec![
            ("approach", handle_approach as HandlerFn),
            ("cover", handle_cover as HandlerFn),
            ("hide", handle_hide as HandlerFn),
            ("up", handle_up as HandlerFn),
            ("down", handle_down as HandlerFn),
        ],
        ..BehaviorModule::default()
    }
}

fn changes(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
}

/// Shared positioning core: find an accessible item or actor, check the
/// required property on items, set posture and focus.
fn position_at(
    accessor: &mut StateAccessor,
    action: &ParsedAction,
    required_property: Option<&str>,
    posture: &str,
    refusal: &str,
    success: impl Fn(&str) -> String,
) -> HandlerResult {
    let (actor_id, _) = match actor_and_location(accessor, action) {
        Ok(pair) => pair,
        Err(failure) => return failure,
    };
    let object = match require_object(action, "Where do you mean?") {
        Ok(word) => word,
        Err(failure) => return failure,
    };
    let adjective = action.adjective.as_deref();

    let target: Option<(String, String)> = find_accessible_item(accessor, object, &actor_id, adjective)
        .map(|id| {
            let name = accessor.get_item(&id).map(|i| i.name.clone()).unwrap_or_default();
            let allowed = required_property.is_none_or(|prop| {
                accessor.get_item(&id).is_some_and(|item| item.prop_bool(prop))
            });
            (id.0, name, allowed)
        })
        .or_else(|| {
            // only untargeted approach makes sense toward actors
            if required_property.is_none() {
                find_actor_by_name(accessor, object, &actor_id).map(|id| {
                    let name = accessor.get_actor(&id).map(|a| a.name.clone()).unwrap_or_default();
                    (id.0, name, true)
                })
            } else {
                None
            }
        })
        .and_then(|(id, name, allowed)| {
            if allowed {
                Some((id, name))
            } else {
                None
            }
        });

    let Some((target_id, target_name)) = target else {
        // distinguish "not here" from "here but unsuitable"
        if find_accessible_item(accessor, object, &actor_id, adjective).is_some() {
            return HandlerResult::failure(format!("{refusal} the {}.", object.word));
        }
        return HandlerResult::failure(format!(
            "You don't see any {} here.",
            display_name(Some(object), adjective)
        ));
    };

    let result = accessor.update(
        &EntityRef::Actor(actor_id.clone()),
        &changes(&[
            ("posture", Value::from(posture)),
            ("focused_on", Value::from(target_id.as_str())),
        ]),
        Some(&action.verb),
        Some(&actor_id),
    );
    if !result.success {
        return HandlerResult::failure(result.message.unwrap_or_default());
    }
    HandlerResult::success(success(&target_name))
        .append(result.message.as_deref().unwrap_or(""))
        .with_data(NarrationData {
            id: Some(target_id),
            posture: Some(posture.to_string()),
            ..NarrationData::default()
        })
}

pub fn handle_approach(accessor: &mut StateAccessor, action: &ParsedAction) -> HandlerResult {
    position_at(accessor, action, None, "none", "You can't approach", |name| {
        format!("You move closer to the {name}.")
    })
}

pub fn handle_cover(accessor: &mut StateAccessor, action: &ParsedAction) -> HandlerResult {
    position_at(
        accessor,
        action,
        Some("provides_cover"),
        "cover",
        "You can't take cover behind",
        |name| format!("You take cover behind the {name}."),
    )
}

pub fn handle_hide(accessor: &mut StateAccessor, action: &ParsedAction) -> HandlerResult {
    position_at(
        accessor,
        action,
        Some("allows_concealment"),
        "concealed",
        "You can't hide in",
        |name| format!("You conceal yourself in the {name}."),
    )
}

/// Clear posture if there is one; otherwise go in the named direction.
fn unwind_or_move(accessor: &mut StateAccessor, action: &ParsedAction, direction: &str) -> HandlerResult {
    let (actor_id, location_id) = match actor_and_location(accessor, action) {
        Ok(pair) => pair,
        Err(failure) => return failure,
    };
    let posture = accessor
        .get_actor(&actor_id)
        .and_then(|a| a.prop_str("posture").map(str::to_string))
        .filter(|p| p != "none");

    if posture.is_some() {
        let result = accessor.update(
            &EntityRef::Actor(actor_id.clone()),
            &changes(&[("posture", Value::from("none")), ("focused_on", Value::Null)]),
            None,
            None,
        );
        if !result.success {
            return HandlerResult::failure(result.message.unwrap_or_default());
        }
        return HandlerResult::success(if direction == "down" {
            "You climb back down."
        } else {
            "You straighten up."
        });
    }
    traverse_exit(accessor, &actor_id, &location_id, direction)
}

pub fn handle_up(accessor: &mut StateAccessor, action: &ParsedAction) -> HandlerResult {
    unwind_or_move(accessor, action, "up")
}

pub fn handle_down(accessor: &mut StateAccessor, action: &ParsedAction) -> HandlerResult {
    unwind_or_move(accessor, action, "down")
}
