//! Command handlers.
//!
//! Each submodule is a behavior module contributing vocabulary and
//! `handle_<verb>` functions. Every handler has the same signature and
//! reads its acting actor from the action — the player gets no special
//! treatment, which is what lets NPC drivers reuse the whole verb surface.

pub mod consumables;
pub mod dialog;
pub mod interaction;
pub mod locks;
pub mod manipulation;
pub mod movement;
pub mod perception;
pub mod spatial;

use crate::accessor::StateAccessor;
use crate::action::{HandlerResult, NarrationData, ParsedAction, WordRef};

use skein_data::{ActorId, ItemId, LocationId};

/// The name to echo back for a noun the world doesn't know.
pub(crate) fn display_name(word: Option<&WordRef>, adjective: Option<&str>) -> String {
    let noun = word.map(|w| w.word.as_str()).unwrap_or("that");
    match adjective {
        Some(adj) => format!("{adj} {noun}"),
        None => noun.to_string(),
    }
}

/// Resolve the acting actor and its location, failing with gameplay-grade
/// messages. Actor lookup failure is a state bug, not a player mistake.
pub(crate) fn actor_and_location(
    accessor: &StateAccessor,
    action: &ParsedAction,
) -> Result<(ActorId, LocationId), HandlerResult> {
    let actor_id = action.actor_id.clone();
    let Some(actor) = accessor.get_actor(&actor_id) else {
        return Err(HandlerResult::failure(format!(
            "Something is inconsistent here: no such actor '{actor_id}'."
        )));
    };
    let location_id = actor.location.clone();
    if accessor.get_location(&location_id).is_none() {
        return Err(HandlerResult::failure(format!(
            "Something is inconsistent here: '{actor_id}' is nowhere."
        )));
    }
    Ok((actor_id, location_id))
}

/// Require the action to carry a direct object.
pub(crate) fn require_object<'a>(action: &'a ParsedAction, prompt: &str) -> Result<&'a WordRef, HandlerResult> {
    action
        .object
        .as_ref()
        .ok_or_else(|| HandlerResult::failure(prompt.to_string()))
}

/// Narration data for an item: its id plus any llm_context traits.
pub(crate) fn item_data(accessor: &StateAccessor, item_id: &ItemId) -> NarrationData {
    match accessor.get_item(item_id) {
        Some(item) => NarrationData::for_entity(item.id.as_str(), item.llm_context()),
        None => NarrationData::default(),
    }
}
