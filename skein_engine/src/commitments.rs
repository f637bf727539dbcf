//! Commitment tick: promises the world keeps or breaks.
//!
//! A commitment is created by a reaction (`create_commitment`) from a
//! config entry and then checked once per turn: if its success flag has
//! been set it becomes fulfilled; if its duration elapses first it fails
//! and its `failure_effects` land — flags, trust shifts, state changes,
//! death marks, gossip.

use crate::accessor::StateAccessor;
use crate::infra::{apply_trust_change, create_gossip, mark_dead, set_actor_state};

use log::info;
use skein_data::{ActorId, CommitmentState, Value};
use skein_data::value::Props;

/// Advance every active commitment one turn. Returns narration beats from
/// failures (success is quiet unless configured otherwise).
pub fn tick_commitments(accessor: &mut StateAccessor) -> Vec<String> {
    let now = accessor.current_turn();
    let mut beats = Vec::new();

    let ids: Vec<String> = accessor
        .state
        .commitments
        .iter()
        .filter(|(_, c)| c.state.is_active())
        .map(|(id, _)| id.clone())
        .collect();

    for id in ids {
        let Some(commitment) = accessor.state.commitments.get(&id).cloned() else {
            continue;
        };

        let fulfilled =
            !commitment.success_condition.is_empty() && accessor.state.flag_set(&commitment.success_condition);
        if fulfilled {
            info!("commitment '{id}' fulfilled on turn {now}");
            if let Some(c) = accessor.state.commitments.get_mut(&id) {
                c.state = CommitmentState::Fulfilled;
            }
            continue;
        }

        if now.saturating_sub(commitment.created_turn) >= commitment.duration {
            info!("commitment '{id}' failed on turn {now} (created {}, duration {})",
                commitment.created_turn, commitment.duration);
            if let Some(c) = accessor.state.commitments.get_mut(&id) {
                c.state = CommitmentState::Failed;
            }
            beats.extend(apply_failure_effects(accessor, &id, &commitment.failure_effects));
        }
    }
    beats
}

fn apply_failure_effects(accessor: &mut StateAccessor, commitment_id: &str, effects: &Props) -> Vec<String> {
    let mut beats = Vec::new();

    if let Some(Value::Map(flags)) = effects.get("set_flags") {
        for (flag, value) in flags.clone() {
            accessor.state.set_flag(&flag, value);
        }
    }
    if let Some(Value::Map(trust_changes)) = effects.get("trust_changes").cloned() {
        for (target, delta) in &trust_changes {
            if let Some(delta) = delta.as_int() {
                apply_trust_change(accessor, &ActorId::from(target.as_str()), delta, None);
            }
        }
    }
    if let Some(Value::Map(state_changes)) = effects.get("state_changes").cloned() {
        for (target, new_state) in &state_changes {
            if let Some(new_state) = new_state.as_str() {
                set_actor_state(accessor, &ActorId::from(target.as_str()), new_state);
            }
        }
    }
    for target in effects.get("mark_dead").map(Value::as_str_list).unwrap_or_default() {
        let target_id = ActorId::from(target);
        if let Some(feedback) = mark_dead(accessor, &target_id, &format!("commitment '{commitment_id}' failed")) {
            beats.push(feedback);
        }
    }
    if let Some(gossip) = effects.get("create_gossip") {
        let content = gossip
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or("Word spreads of a promise broken")
            .to_string();
        let source = gossip
            .get("source")
            .and_then(Value::as_str)
            .unwrap_or("witnesses")
            .to_string();
        let targets: Vec<ActorId> = gossip
            .get("targets")
            .map(Value::as_str_list)
            .unwrap_or_default()
            .into_iter()
            .map(ActorId::from)
            .collect();
        let delay = gossip
            .get("delay")
            .and_then(Value::as_int)
            .and_then(|d| u64::try_from(d).ok())
            .unwrap_or(0);
        let gossip_id = gossip
            .get("id")
            .and_then(Value::as_str)
            .map_or_else(|| format!("gossip_{commitment_id}_failed"), str::to_string);
        create_gossip(accessor.state, &content, &source, targets, delay, &gossip_id);
    }
    if let Some(message) = effects.get("message").and_then(Value::as_str) {
        if !message.is_empty() {
            beats.push(message.to_string());
        }
    }
    beats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::BehaviorManager;
    use crate::infra::create_commitment;
    use skein_data::{Actor, GameState, Location, LocationId, Metadata, value_map};

    fn world_with_commitment() -> GameState {
        let mut state = GameState {
            metadata: Metadata {
                start_location: LocationId::from("loc_hall"),
                ..Metadata::default()
            },
            ..GameState::default()
        };
        state.locations.insert(
            LocationId::from("loc_hall"),
            Location {
                id: LocationId::from("loc_hall"),
                ..Location::default()
            },
        );
        for id in ["player", "npc_echo"] {
            state.actors.insert(
                ActorId::from(id),
                Actor {
                    id: ActorId::from(id),
                    name: id.into(),
                    location: LocationId::from("loc_hall"),
                    ..Actor::default()
                },
            );
        }
        state.extra.insert(
            "commitment_configs".into(),
            value_map! {
                "commit_aldric" => value_map! {
                    "duration" => 15,
                    "success_condition" => "aldric_rescued",
                    "failure_effects" => value_map! {
                        "set_flags" => value_map! { "aldric_died" => true },
                        "create_gossip" => value_map! {
                            "content" => "Aldric perished in the depths",
                            "targets" => vec![Value::from("npc_echo")],
                            "delay" => 0,
                        },
                    },
                },
            },
        );
        state.turn = 1;
        create_commitment(&mut state, "commit_aldric", 1);
        state
    }

    fn tick(state: &mut GameState) -> Vec<String> {
        let manager = BehaviorManager::new(vec![]).unwrap();
        let mut accessor = StateAccessor::new(state, &manager);
        tick_commitments(&mut accessor)
    }

    #[test]
    fn active_commitment_survives_before_deadline() {
        let mut state = world_with_commitment();
        state.turn = 10;
        tick(&mut state);
        assert!(state.commitments["commit_aldric"].state.is_active());
    }

    #[test]
    fn success_flag_fulfills() {
        let mut state = world_with_commitment();
        state.set_flag("aldric_rescued", Value::Bool(true));
        state.turn = 5;
        tick(&mut state);
        assert!(state.commitments["commit_aldric"].state.is_fulfilled());
        // no failure effects fired
        assert!(!state.flag_set("aldric_died"));
        assert!(state.gossip_queue.is_empty());
    }

    #[test]
    fn deadline_fails_and_applies_effects() {
        let mut state = world_with_commitment();
        state.turn = 16; // created on 1, duration 15
        tick(&mut state);

        assert!(state.commitments["commit_aldric"].state.is_failed());
        assert!(state.flag_set("aldric_died"));
        assert_eq!(state.gossip_queue.len(), 1);
        assert_eq!(state.gossip_queue[0].targets, vec![ActorId::from("npc_echo")]);
    }

    #[test]
    fn failed_commitment_does_not_fail_twice() {
        let mut state = world_with_commitment();
        state.turn = 16;
        tick(&mut state);
        assert_eq!(state.gossip_queue.len(), 1);
        state.turn = 17;
        tick(&mut state);
        assert_eq!(state.gossip_queue.len(), 1);
    }

    #[test]
    fn success_exactly_at_deadline_wins_over_failure() {
        let mut state = world_with_commitment();
        state.set_flag("aldric_rescued", Value::Bool(true));
        state.turn = 16;
        tick(&mut state);
        assert!(state.commitments["commit_aldric"].state.is_fulfilled());
    }
}
