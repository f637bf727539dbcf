//! Packs and relationships.
//!
//! A `pack_id` groups actors; one may carry `pack_role: alpha`. Disposition
//! syncing copies the alpha's disposition onto followers — the coarse
//! counterpart of the state-machine mirroring the reaction dispatcher
//! does. Relationships are per-pair, per-axis integers with configurable
//! thresholds (feed a wolf enough and `gratitude` crosses into
//! `domestication`).

use crate::accessor::StateAccessor;

use log::info;
use skein_data::{Actor, ActorId, Value};
use std::collections::BTreeMap;

/// Result of a relationship adjustment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipChange {
    pub old_value: i64,
    pub new_value: i64,
    /// Name of the threshold this write crossed, if any.
    pub threshold_crossed: Option<String>,
}

fn pack_members(accessor: &StateAccessor, pack_id: &str) -> Vec<ActorId> {
    accessor
        .state
        .actors
        .values()
        .filter(|actor| actor.prop_str("pack_id") == Some(pack_id))
        .map(|actor| actor.id.clone())
        .collect()
}

fn pack_alpha(accessor: &StateAccessor, pack_id: &str) -> Option<ActorId> {
    accessor
        .state
        .actors
        .values()
        .find(|actor| actor.prop_str("pack_id") == Some(pack_id) && actor.prop_str("pack_role") == Some("alpha"))
        .map(|actor| actor.id.clone())
}

/// Copy the alpha's disposition onto every follower in the pack. Returns
/// the ids of followers whose disposition actually changed.
pub fn sync_pack_disposition(accessor: &mut StateAccessor, pack_id: &str) -> Vec<ActorId> {
    let Some(alpha_id) = pack_alpha(accessor, pack_id) else {
        return Vec::new();
    };
    let alpha_disposition = accessor
        .get_actor(&alpha_id)
        .map(|alpha| alpha.disposition().to_string())
        .unwrap_or_default();

    let mut changed = Vec::new();
    for member_id in pack_members(accessor, pack_id) {
        if member_id == alpha_id {
            continue;
        }
        let Some(member) = accessor.state.get_actor_mut(&member_id) else {
            continue;
        };
        if member.disposition() != alpha_disposition {
            member
                .properties
                .insert("disposition".to_string(), Value::from(alpha_disposition.as_str()));
            changed.push(member_id);
        }
    }
    if !changed.is_empty() {
        info!("pack '{pack_id}': {} follower(s) now {alpha_disposition}", changed.len());
    }
    changed
}

/// Sync one follower to its pack's alpha. Returns whether it changed.
pub fn sync_follower_disposition(accessor: &mut StateAccessor, follower_id: &ActorId) -> bool {
    let Some(pack_id) = accessor
        .get_actor(follower_id)
        .and_then(|follower| follower.prop_str("pack_id").map(str::to_string))
    else {
        return false;
    };
    let Some(alpha_id) = pack_alpha(accessor, &pack_id) else {
        return false;
    };
    if &alpha_id == follower_id {
        return false;
    }
    let alpha_disposition = accessor
        .get_actor(&alpha_id)
        .map(|alpha| alpha.disposition().to_string())
        .unwrap_or_default();

    let Some(follower) = accessor.state.get_actor_mut(follower_id) else {
        return false;
    };
    if follower.disposition() == alpha_disposition {
        return false;
    }
    follower
        .properties
        .insert("disposition".to_string(), Value::from(alpha_disposition.as_str()));
    true
}

/// An actor's relationship axes toward another, empty when none exist.
pub fn get_relationship(actor: &Actor, other_id: &str) -> BTreeMap<String, i64> {
    actor
        .prop("relationships")
        .and_then(|relationships| relationships.get(other_id))
        .and_then(Value::as_map)
        .map(|axes| {
            axes.iter()
                .filter_map(|(axis, value)| value.as_int().map(|v| (axis.clone(), v)))
                .collect()
        })
        .unwrap_or_default()
}

/// Adjust one relationship axis, creating intermediate maps on demand, and
/// report any configured threshold the write crossed.
///
/// Thresholds come from the actor's `relationship_thresholds` property:
/// `{"gratitude": {"3": "domestication"}}`.
pub fn modify_relationship(
    accessor: &mut StateAccessor,
    actor_id: &ActorId,
    other_id: &str,
    axis: &str,
    delta: i64,
) -> RelationshipChange {
    let old_value = accessor
        .get_actor(actor_id)
        .map(|actor| get_relationship(actor, other_id).get(axis).copied().unwrap_or(0))
        .unwrap_or(0);
    let new_value = old_value + delta;

    let thresholds: Vec<(i64, String)> = accessor
        .get_actor(actor_id)
        .and_then(|actor| actor.prop("relationship_thresholds"))
        .and_then(|config| config.get(axis))
        .and_then(Value::as_map)
        .map(|axis_thresholds| {
            axis_thresholds
                .iter()
                .filter_map(|(raw, name)| {
                    raw.parse::<i64>()
                        .ok()
                        .and_then(|threshold| name.as_str().map(|n| (threshold, n.to_string())))
                })
                .collect()
        })
        .unwrap_or_default();

    if let Some(actor) = accessor.state.get_actor_mut(actor_id) {
        let relationships = actor
            .properties
            .entry("relationships".to_string())
            .or_insert_with(|| Value::Map(BTreeMap::new()));
        if let Value::Map(by_other) = relationships {
            let axes = by_other
                .entry(other_id.to_string())
                .or_insert_with(|| Value::Map(BTreeMap::new()));
            if let Value::Map(axes) = axes {
                axes.insert(axis.to_string(), Value::Int(new_value));
            }
        }
    }

    let threshold_crossed = thresholds
        .into_iter()
        .find(|(threshold, _)| old_value < *threshold && new_value >= *threshold)
        .map(|(_, name)| name);
    if let Some(name) = &threshold_crossed {
        info!("'{actor_id}' {axis} toward '{other_id}' crossed threshold '{name}'");
    }

    RelationshipChange {
        old_value,
        new_value,
        threshold_crossed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::BehaviorManager;
    use skein_data::{GameState, Location, LocationId, Metadata, value_map};

    fn pack_world() -> GameState {
        let mut state = GameState {
            metadata: Metadata {
                start_location: LocationId::from("loc_clearing"),
                ..Metadata::default()
            },
            ..GameState::default()
        };
        state.locations.insert(
            LocationId::from("loc_clearing"),
            Location {
                id: LocationId::from("loc_clearing"),
                ..Location::default()
            },
        );
        for (id, role) in [
            ("npc_alpha_wolf", "alpha"),
            ("npc_wolf_1", "follower"),
            ("npc_wolf_2", "follower"),
        ] {
            let mut actor = Actor {
                id: ActorId::from(id),
                name: id.into(),
                location: LocationId::from("loc_clearing"),
                ..Actor::default()
            };
            actor.properties.insert("pack_id".into(), Value::from("wolf_pack"));
            actor.properties.insert("pack_role".into(), Value::from(role));
            actor.properties.insert("disposition".into(), Value::from("hostile"));
            state.actors.insert(actor.id.clone(), actor);
        }
        state
    }

    fn with_accessor<T>(state: &mut GameState, run: impl FnOnce(&mut StateAccessor) -> T) -> T {
        let manager = BehaviorManager::new(vec![]).unwrap();
        let mut accessor = StateAccessor::new(state, &manager);
        run(&mut accessor)
    }

    #[test]
    fn sync_pack_copies_alpha_disposition_to_followers() {
        let mut state = pack_world();
        state
            .actors
            .get_mut(&ActorId::from("npc_alpha_wolf"))
            .unwrap()
            .properties
            .insert("disposition".into(), Value::from("neutral"));

        let changed = with_accessor(&mut state, |accessor| sync_pack_disposition(accessor, "wolf_pack"));
        assert_eq!(changed.len(), 2);
        assert!(changed.contains(&ActorId::from("npc_wolf_1")));
        assert!(changed.contains(&ActorId::from("npc_wolf_2")));
        for id in ["npc_wolf_1", "npc_wolf_2"] {
            assert_eq!(state.get_actor(&ActorId::from(id)).unwrap().disposition(), "neutral");
        }
    }

    #[test]
    fn sync_pack_reports_only_real_changes() {
        let mut state = pack_world();
        // everyone already hostile: nothing to change
        let changed = with_accessor(&mut state, |accessor| sync_pack_disposition(accessor, "wolf_pack"));
        assert!(changed.is_empty());
    }

    #[test]
    fn sync_single_follower_leaves_the_rest() {
        let mut state = pack_world();
        state
            .actors
            .get_mut(&ActorId::from("npc_alpha_wolf"))
            .unwrap()
            .properties
            .insert("disposition".into(), Value::from("friendly"));

        let changed = with_accessor(&mut state, |accessor| {
            sync_follower_disposition(accessor, &ActorId::from("npc_wolf_1"))
        });
        assert!(changed);
        assert_eq!(
            state.get_actor(&ActorId::from("npc_wolf_1")).unwrap().disposition(),
            "friendly"
        );
        assert_eq!(
            state.get_actor(&ActorId::from("npc_wolf_2")).unwrap().disposition(),
            "hostile"
        );
    }

    #[test]
    fn relationship_starts_empty_and_stacks() {
        let mut state = pack_world();
        let alpha_id = ActorId::from("npc_alpha_wolf");
        assert!(get_relationship(state.get_actor(&alpha_id).unwrap(), "player").is_empty());

        with_accessor(&mut state, |accessor| {
            for _ in 0..3 {
                modify_relationship(accessor, &alpha_id, "player", "gratitude", 1);
            }
        });
        let relationship = get_relationship(state.get_actor(&alpha_id).unwrap(), "player");
        assert_eq!(relationship.get("gratitude"), Some(&3));
    }

    #[test]
    fn threshold_crossing_is_reported_once() {
        let mut state = pack_world();
        let alpha_id = ActorId::from("npc_alpha_wolf");
        state
            .actors
            .get_mut(&alpha_id)
            .unwrap()
            .properties
            .insert(
                "relationship_thresholds".into(),
                value_map! { "gratitude" => value_map! { "3" => "domestication" } },
            );

        with_accessor(&mut state, |accessor| {
            let first = modify_relationship(accessor, &alpha_id, "player", "gratitude", 1);
            assert_eq!(first.threshold_crossed, None);
            let second = modify_relationship(accessor, &alpha_id, "player", "gratitude", 1);
            assert_eq!(second.threshold_crossed, None);
            let third = modify_relationship(accessor, &alpha_id, "player", "gratitude", 1);
            assert_eq!(third.threshold_crossed.as_deref(), Some("domestication"));
            assert_eq!(third.old_value, 2);
            assert_eq!(third.new_value, 3);
            // already past the threshold: no re-report
            let fourth = modify_relationship(accessor, &alpha_id, "player", "gratitude", 1);
            assert_eq!(fourth.threshold_crossed, None);
        });
    }

    #[test]
    fn big_jump_still_crosses_the_threshold() {
        let mut state = pack_world();
        let alpha_id = ActorId::from("npc_alpha_wolf");
        state
            .actors
            .get_mut(&alpha_id)
            .unwrap()
            .properties
            .insert(
                "relationship_thresholds".into(),
                value_map! { "gratitude" => value_map! { "3" => "domestication" } },
            );
        with_accessor(&mut state, |accessor| {
            let jump = modify_relationship(accessor, &alpha_id, "player", "gratitude", 5);
            assert_eq!(jump.threshold_crossed.as_deref(), Some("domestication"));
        });
    }
}
