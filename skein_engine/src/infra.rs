//! Cross-cutting state primitives shared by dispatchers and handlers:
//! bounded trust, actor state machines with pack mirroring, commitment and
//! gossip creation, and health changes with death dispatch.

use crate::accessor::StateAccessor;
use crate::behavior::EventContext;

use log::{info, warn};
use skein_data::{ActorId, Commitment, CommitmentState, EntityRef, GameState, Gossip, TrustState, Value};

/// Clamp a trust write into `[floor, ceiling]`, saturating at the bounds.
pub fn modify_trust(current: i64, delta: i64, floor: i64, ceiling: i64) -> i64 {
    current.saturating_add(delta).clamp(floor, ceiling)
}

/// Apply a signed trust change to an NPC, honoring its configured bounds,
/// and fire any `trust_transitions` thresholds the write crosses.
///
/// `transitions` maps threshold strings to state names
/// (`{"3": "friendly"}`); crossing a threshold in either direction
/// transitions the NPC's state machine, which mirrors to its pack.
/// Returns the new trust value.
pub fn apply_trust_change(
    accessor: &mut StateAccessor,
    actor_id: &ActorId,
    delta: i64,
    transitions: Option<&Value>,
) -> i64 {
    let Some(actor) = accessor.get_actor(actor_id) else {
        warn!("apply_trust_change: unknown actor '{actor_id}'");
        return 0;
    };
    let trust = actor.trust_state().unwrap_or_default();
    let new_trust = modify_trust(trust.current, delta, trust.floor, trust.ceiling);

    if let Some(actor) = accessor.state.get_actor_mut(actor_id) {
        actor.properties.insert(
            "trust_state".to_string(),
            TrustState {
                current: new_trust,
                ..trust
            }
            .to_value(),
        );
    }

    if let Some(Value::Map(transitions)) = transitions {
        for (threshold_raw, target) in transitions {
            let Ok(threshold) = threshold_raw.parse::<i64>() else {
                warn!("trust transition threshold '{threshold_raw}' on '{actor_id}' is not an integer");
                continue;
            };
            let Some(target) = target.as_str() else {
                continue;
            };
            let crossed_up = trust.current < threshold && new_trust >= threshold;
            let crossed_down = trust.current > threshold && new_trust <= threshold;
            if crossed_up || crossed_down {
                info!("'{actor_id}' trust crossed {threshold}; transitioning to '{target}'");
                set_actor_state(accessor, actor_id, target);
            }
        }
    }
    new_trust
}

/// Transition an actor's state machine. The only allowed mutation path for
/// `state_machine.current`; unknown states are added on demand. When the
/// state changes, `on_leader_state_change` fires so pack mirroring can run.
/// Returns whether a transition occurred.
pub fn set_actor_state(accessor: &mut StateAccessor, actor_id: &ActorId, new_state: &str) -> bool {
    let Some(actor) = accessor.get_actor(actor_id) else {
        warn!("set_actor_state: unknown actor '{actor_id}'");
        return false;
    };
    let Some(mut machine) = actor.state_machine() else {
        warn!("set_actor_state: '{actor_id}' has no state machine");
        return false;
    };
    if !machine.transition(new_state) {
        return false;
    }
    if let Some(actor) = accessor.state.get_actor_mut(actor_id) {
        actor.properties.insert("state_machine".to_string(), machine.to_value());
    }
    info!("'{actor_id}' state machine -> '{new_state}'");

    let context = EventContext::default()
        .with_extra("new_state", new_state)
        .with_extra("leader_id", actor_id.as_str());
    accessor.invoke_behavior(&EntityRef::Actor(actor_id.clone()), "on_leader_state_change", &context);
    true
}

/// Instantiate a commitment from its config entry.
///
/// Commitment configs live under `extra.commitment_configs`, keyed by id,
/// each carrying `duration`, `success_condition`, and `failure_effects`.
pub fn create_commitment(state: &mut GameState, config_id: &str, current_turn: u64) {
    let Some(config) = state
        .extra
        .get("commitment_configs")
        .and_then(|configs| configs.get(config_id))
        .cloned()
    else {
        warn!("create_commitment: no config for '{config_id}'");
        return;
    };
    if state.commitments.contains_key(config_id) {
        info!("commitment '{config_id}' already active; not recreating");
        return;
    }

    let duration = config
        .get("duration")
        .and_then(Value::as_int)
        .and_then(|d| u64::try_from(d).ok())
        .unwrap_or(10);
    let success_condition = config
        .get("success_condition")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let failure_effects = config
        .get("failure_effects")
        .and_then(Value::as_map)
        .cloned()
        .unwrap_or_default();

    info!("commitment '{config_id}' created on turn {current_turn} (duration {duration})");
    state.commitments.insert(
        config_id.to_string(),
        Commitment {
            created_turn: current_turn,
            duration,
            success_condition,
            failure_effects,
            state: CommitmentState::Active,
        },
    );
}

/// Queue gossip for delivery `delay_turns` from now.
pub fn create_gossip(
    state: &mut GameState,
    content: &str,
    source: &str,
    targets: Vec<ActorId>,
    delay_turns: u64,
    gossip_id: &str,
) {
    let deliver_turn = state.turn + delay_turns;
    info!("gossip '{gossip_id}' queued for turn {deliver_turn} ({} targets)", targets.len());
    state.gossip_queue.push(Gossip {
        id: gossip_id.to_string(),
        content: content.to_string(),
        source: source.to_string(),
        targets,
        deliver_turn,
    });
}

/// Apply damage to an actor's `health` property, clamped at zero. At zero
/// the actor is marked dead and `on_entity_death` fires. Returns
/// `(new_health, died_this_call)`.
pub fn apply_damage(accessor: &mut StateAccessor, actor_id: &ActorId, amount: i64, cause: &str) -> (i64, bool) {
    let Some(actor) = accessor.get_actor(actor_id) else {
        return (0, false);
    };
    let was_alive = !actor.prop_bool("dead");
    let health = actor.prop_int("health").unwrap_or(100);
    let new_health = (health - amount).max(0);

    if let Some(actor) = accessor.state.get_actor_mut(actor_id) {
        actor.properties.insert("health".to_string(), Value::Int(new_health));
    }
    if new_health == 0 && was_alive {
        mark_dead(accessor, actor_id, cause);
        return (0, true);
    }
    (new_health, false)
}

/// Heal an actor up to its `max_health` property. Returns the new health.
pub fn apply_healing(accessor: &mut StateAccessor, actor_id: &ActorId, amount: i64) -> i64 {
    let Some(actor) = accessor.get_actor(actor_id) else {
        return 0;
    };
    let health = actor.prop_int("health").unwrap_or(100);
    let max_health = actor.prop_int("max_health").unwrap_or(100);
    let new_health = (health + amount).min(max_health);
    if let Some(actor) = accessor.state.get_actor_mut(actor_id) {
        actor.properties.insert("health".to_string(), Value::Int(new_health));
    }
    new_health
}

/// Mark an actor dead and fire the death dispatcher. Idempotent.
pub fn mark_dead(accessor: &mut StateAccessor, actor_id: &ActorId, cause: &str) -> Option<String> {
    let Some(actor) = accessor.get_actor(actor_id) else {
        return None;
    };
    if actor.prop_bool("dead") {
        return None;
    }
    if let Some(actor) = accessor.state.get_actor_mut(actor_id) {
        actor.properties.insert("dead".to_string(), Value::Bool(true));
        actor.properties.insert("health".to_string(), Value::Int(0));
    }
    info!("'{actor_id}' died ({cause})");

    let context = EventContext::default().with_extra("cause", cause);
    let result = accessor.invoke_behavior(&EntityRef::Actor(actor_id.clone()), "on_entity_death", &context);
    result.feedback
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::BehaviorManager;
    use skein_data::{Actor, Location, LocationId, Metadata, value_map};

    fn base_state() -> GameState {
        let mut state = GameState {
            metadata: Metadata {
                start_location: LocationId::from("loc_den"),
                ..Metadata::default()
            },
            ..GameState::default()
        };
        state.locations.insert(
            LocationId::from("loc_den"),
            Location {
                id: LocationId::from("loc_den"),
                ..Location::default()
            },
        );
        state.actors.insert(
            ActorId::from("npc_wolf"),
            Actor {
                id: ActorId::from("npc_wolf"),
                name: "wolf".into(),
                location: LocationId::from("loc_den"),
                ..Actor::default()
            },
        );
        state
    }

    #[test]
    fn trust_clamps_at_both_bounds() {
        assert_eq!(modify_trust(4, 3, -5, 5), 5);
        assert_eq!(modify_trust(-4, -3, -5, 5), -5);
        assert_eq!(modify_trust(0, 2, -5, 5), 2);
        assert_eq!(modify_trust(5, 1, -5, 5), 5);
    }

    #[test]
    fn trust_change_writes_back_and_respects_config() {
        let manager = BehaviorManager::new(vec![]).unwrap();
        let mut state = base_state();
        state
            .actors
            .get_mut(&ActorId::from("npc_wolf"))
            .unwrap()
            .properties
            .insert(
                "trust_state".into(),
                value_map! { "current" => 1, "floor" => -2, "ceiling" => 2 },
            );
        let mut accessor = StateAccessor::new(&mut state, &manager);

        let new_trust = apply_trust_change(&mut accessor, &ActorId::from("npc_wolf"), 5, None);
        assert_eq!(new_trust, 2);
        let trust = accessor
            .get_actor(&ActorId::from("npc_wolf"))
            .unwrap()
            .trust_state()
            .unwrap();
        assert_eq!(trust.current, 2);
        assert_eq!(trust.ceiling, 2);
    }

    #[test]
    fn crossing_a_threshold_transitions_state() {
        let manager = BehaviorManager::new(vec![]).unwrap();
        let mut state = base_state();
        {
            let wolf = state.actors.get_mut(&ActorId::from("npc_wolf")).unwrap();
            wolf.properties.insert(
                "state_machine".into(),
                value_map! {
                    "states" => vec![Value::from("wary"), Value::from("friendly")],
                    "initial" => "wary",
                    "current" => "wary",
                },
            );
            wolf.properties
                .insert("trust_state".into(), value_map! { "current" => 2 });
        }
        let mut accessor = StateAccessor::new(&mut state, &manager);

        let transitions = value_map! { "3" => "friendly" };
        apply_trust_change(&mut accessor, &ActorId::from("npc_wolf"), 1, Some(&transitions));

        let machine = accessor
            .get_actor(&ActorId::from("npc_wolf"))
            .unwrap()
            .state_machine()
            .unwrap();
        assert_eq!(machine.current, "friendly");
    }

    #[test]
    fn threshold_not_crossed_leaves_state_alone() {
        let manager = BehaviorManager::new(vec![]).unwrap();
        let mut state = base_state();
        {
            let wolf = state.actors.get_mut(&ActorId::from("npc_wolf")).unwrap();
            wolf.properties.insert(
                "state_machine".into(),
                value_map! { "states" => vec![Value::from("wary")], "initial" => "wary", "current" => "wary" },
            );
            wolf.properties
                .insert("trust_state".into(), value_map! { "current" => 0 });
        }
        let mut accessor = StateAccessor::new(&mut state, &manager);
        apply_trust_change(
            &mut accessor,
            &ActorId::from("npc_wolf"),
            1,
            Some(&value_map! { "3" => "friendly" }),
        );
        let machine = accessor
            .get_actor(&ActorId::from("npc_wolf"))
            .unwrap()
            .state_machine()
            .unwrap();
        assert_eq!(machine.current, "wary");
    }

    #[test]
    fn commitment_created_from_config() {
        let mut state = base_state();
        state.extra.insert(
            "commitment_configs".into(),
            value_map! {
                "commit_rescue" => value_map! {
                    "duration" => 15,
                    "success_condition" => "scholar_rescued",
                    "failure_effects" => value_map! { "set_flags" => value_map! { "scholar_died" => true } },
                },
            },
        );
        state.turn = 4;
        create_commitment(&mut state, "commit_rescue", 4);

        let commitment = state.commitments.get("commit_rescue").unwrap();
        assert_eq!(commitment.created_turn, 4);
        assert_eq!(commitment.duration, 15);
        assert_eq!(commitment.success_condition, "scholar_rescued");
        assert!(commitment.state.is_active());
    }

    #[test]
    fn unknown_commitment_config_is_skipped() {
        let mut state = base_state();
        create_commitment(&mut state, "commit_phantom", 1);
        assert!(state.commitments.is_empty());
    }

    #[test]
    fn gossip_deliver_turn_adds_delay() {
        let mut state = base_state();
        state.turn = 7;
        create_gossip(
            &mut state,
            "The alpha has fallen",
            "witnesses",
            vec![ActorId::from("npc_wolf")],
            10,
            "gossip_alpha_death",
        );
        assert_eq!(state.gossip_queue[0].deliver_turn, 17);
        assert_eq!(state.gossip_queue[0].targets, vec![ActorId::from("npc_wolf")]);
    }

    #[test]
    fn damage_kills_at_zero_and_is_idempotent() {
        let manager = BehaviorManager::new(vec![]).unwrap();
        let mut state = base_state();
        state
            .actors
            .get_mut(&ActorId::from("npc_wolf"))
            .unwrap()
            .properties
            .insert("health".into(), Value::Int(5));
        let mut accessor = StateAccessor::new(&mut state, &manager);

        let (health, died) = apply_damage(&mut accessor, &ActorId::from("npc_wolf"), 3, "spores");
        assert_eq!((health, died), (2, false));
        let (health, died) = apply_damage(&mut accessor, &ActorId::from("npc_wolf"), 10, "spores");
        assert_eq!((health, died), (0, true));
        // already dead: no second death
        let (_, died_again) = apply_damage(&mut accessor, &ActorId::from("npc_wolf"), 10, "spores");
        assert!(!died_again);
    }

    #[test]
    fn healing_clamps_to_max_health() {
        let manager = BehaviorManager::new(vec![]).unwrap();
        let mut state = base_state();
        {
            let wolf = state.actors.get_mut(&ActorId::from("npc_wolf")).unwrap();
            wolf.properties.insert("health".into(), Value::Int(40));
            wolf.properties.insert("max_health".into(), Value::Int(50));
        }
        let mut accessor = StateAccessor::new(&mut state, &manager);
        assert_eq!(apply_healing(&mut accessor, &ActorId::from("npc_wolf"), 100), 50);
    }
}
