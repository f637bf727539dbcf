//! Morale and fleeing.
//!
//! Morale is computed, never stored:
//! `floor(base_morale × health / max_health) + 10·allies
//!  + 20 if the pack alpha is present − 15·enemies`, clamped at zero.
//! An actor below its flee threshold (and not fearless) tries the exits;
//! locked doors bar the way, the roll is an even coin from the injected
//! rng, and the destination is a uniform pick among the open exits.

use crate::accessor::StateAccessor;
use crate::rng::TurnRng;

use log::info;
use skein_data::{Actor, ActorId, LocationId};

pub const DEFAULT_BASE_MORALE: i64 = 100;
pub const DEFAULT_FLEE_THRESHOLD: i64 = 25;
const ALLY_BONUS: i64 = 10;
const ALPHA_BONUS: i64 = 20;
const ENEMY_PENALTY: i64 = 15;

/// Outcome of a flee attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleeResult {
    pub success: bool,
    pub destination: Option<LocationId>,
    pub narration: String,
}

/// Pack-mates sharing the actor's location.
pub fn get_allies<'a>(accessor: &'a StateAccessor, actor: &Actor) -> Vec<&'a Actor> {
    let Some(pack_id) = actor.prop_str("pack_id") else {
        return Vec::new();
    };
    accessor
        .state
        .actors_in_location(&actor.location)
        .into_iter()
        .filter(|other| other.id != actor.id && other.prop_str("pack_id") == Some(pack_id))
        .collect()
}

/// Hostile non-pack actors sharing the location. The player always counts
/// as an enemy to a hostile NPC; neutral bystanders never do.
pub fn get_enemies<'a>(accessor: &'a StateAccessor, actor: &Actor) -> Vec<&'a Actor> {
    let pack_id = actor.prop_str("pack_id");
    let disposition = actor.disposition();

    accessor
        .state
        .actors_in_location(&actor.location)
        .into_iter()
        .filter(|other| {
            if other.id == actor.id {
                return false;
            }
            if pack_id.is_some() && other.prop_str("pack_id") == pack_id {
                return false;
            }
            if other.id.is_player() {
                return disposition == "hostile";
            }
            let other_disposition = other.disposition();
            if other_disposition == "neutral" {
                return false;
            }
            disposition == "hostile" && other_disposition == "hostile"
        })
        .collect()
}

/// Current morale for an actor, from scratch each time.
pub fn get_morale(accessor: &StateAccessor, actor: &Actor) -> i64 {
    let base = actor.prop_int("base_morale").unwrap_or(DEFAULT_BASE_MORALE);
    let health = actor.prop_int("health").unwrap_or(100);
    let max_health = actor.prop_int("max_health").unwrap_or(100).max(1);

    let mut morale = base * health / max_health;

    let allies = get_allies(accessor, actor);
    morale += allies.len() as i64 * ALLY_BONUS;
    if allies.iter().any(|ally| ally.prop_str("pack_role") == Some("alpha")) {
        morale += ALPHA_BONUS;
    }
    morale -= get_enemies(accessor, actor).len() as i64 * ENEMY_PENALTY;

    morale.max(0)
}

/// Should this actor try to run?
pub fn check_flee_condition(accessor: &StateAccessor, actor: &Actor) -> bool {
    if actor.prop_bool("fearless") {
        return false;
    }
    let threshold = actor.prop_int("flee_threshold").unwrap_or(DEFAULT_FLEE_THRESHOLD);
    get_morale(accessor, actor) < threshold
}

/// Try to flee the current location.
///
/// Exits guarded by a locked door are excluded. With no way out the
/// attempt fails outright; otherwise the coin decides, and success picks a
/// uniform random open exit. Tests pass `force_success` instead of
/// rolling.
pub fn attempt_flee(
    accessor: &mut StateAccessor,
    actor_id: &ActorId,
    rng: &mut TurnRng,
    force_success: Option<bool>,
) -> FleeResult {
    let Some(actor) = accessor.get_actor(actor_id) else {
        return FleeResult {
            success: false,
            destination: None,
            narration: "Invalid actor".to_string(),
        };
    };
    let actor_name = actor.name.clone();
    let location_id = actor.location.clone();
    let Some(location) = accessor.get_location(&location_id) else {
        return FleeResult {
            success: false,
            destination: None,
            narration: "Invalid location".to_string(),
        };
    };

    // open escape routes: exits whose door (if any) is not locked
    let mut open_exits: Vec<(String, LocationId)> = Vec::new();
    for (direction, exit) in &location.exits {
        let Some(destination) = &exit.to else {
            continue;
        };
        let blocked = exit
            .door_id
            .as_ref()
            .and_then(|door_id| accessor.get_item(door_id))
            .and_then(|door| door.door.as_ref())
            .is_some_and(|door| door.locked);
        if !blocked {
            open_exits.push((direction.clone(), destination.clone()));
        }
    }

    if open_exits.is_empty() {
        return FleeResult {
            success: false,
            destination: None,
            narration: format!("{actor_name} looks for an escape but there is no escape route!"),
        };
    }

    let success = force_success.unwrap_or_else(|| rng.coin_flip());
    if !success {
        return FleeResult {
            success: false,
            destination: None,
            narration: format!("{actor_name} tries to flee but fails!"),
        };
    }

    let pick = rng.pick_index(open_exits.len()).unwrap_or(0);
    let (direction, destination) = open_exits.swap_remove(pick);
    accessor.state.relocate_actor(actor_id, &destination);
    info!("'{actor_id}' fled {direction} to '{destination}'");

    FleeResult {
        success: true,
        destination: Some(destination),
        narration: format!("{actor_name} flees to the {direction}!"),
    }
}
