//! Reaction dispatchers: the data-driven core.
//!
//! Each dispatcher is registered against a synthetic event and follows the
//! same pattern: read the entity's reaction config from a well-known
//! property key; if the config names a `handler`, resolve and call it
//! through the registry; otherwise walk the named reactions, pick the
//! first whose gating passes, and apply its declared effects. A handler
//! path that fails to resolve is logged and falls through to the
//! data-driven pass — it is never silently eaten.
//!
//! Gates: `triggers` (substring match against the spoken keyword),
//! `accepted_items` (substring match against the item in play),
//! `requires_flags` / `forbidden_flags` (global flags), `requires_state`
//! (the entity's state machine). Effects: `set_flags`, `trust_delta`
//! (with `trust_transitions`), `transition_to`, `create_commitment`,
//! `create_gossip`, and a feedback message under `response` or `message`.

use crate::accessor::StateAccessor;
use crate::behavior::{BehaviorFn, BehaviorModule, EventContext, Verdict};
use crate::infra::{apply_damage, apply_trust_change, create_commitment, create_gossip, set_actor_state};
use crate::vocab::{EventDef, Vocabulary};

use log::warn;
use skein_data::{ActorId, EntityRef, ItemId, StateMachine, Value};
use std::collections::BTreeMap;

/// The infrastructure dispatcher module: global, so every entity gets its
/// reaction configs honored without listing the module explicitly.
pub fn module() -> BehaviorModule {
    let declared = [
        ("on_gift_given", "gift reactions when items are offered"),
        ("on_receive_item", "trades executed when items change hands"),
        ("on_dialog_received", "keyword reactions outside the topic engine"),
        ("on_item_used", "reactions to 'use X on Y'"),
        ("on_entity_death", "consequences when an entity dies"),
        ("on_leader_state_change", "pack followers mirror their leader"),
        ("on_first_meeting", "encounter reactions on first contact"),
        ("on_regional_turn", "per-turn regional effects"),
    ];
    BehaviorModule {
        path: "infrastructure.reactions",
        vocabulary: Vocabulary {
            events: declared
                .iter()
                .map(|(event, description)| EventDef {
                    event: (*event).to_string(),
                    description: (*description).to_string(),
                })
                .collect(),
            ..Vocabulary::default()
        },
        events: vec![
            ("on_gift_given", on_gift_given as BehaviorFn),
            ("on_receive_item", on_receive_item as BehaviorFn),
            ("on_dialog_received", on_dialog_received as BehaviorFn),
            ("on_item_used", on_item_used as BehaviorFn),
            ("on_entity_death", on_entity_death as BehaviorFn),
            ("on_leader_state_change", on_leader_state_change as BehaviorFn),
            ("on_first_meeting", on_first_meeting as BehaviorFn),
            ("on_regional_turn", on_regional_turn as BehaviorFn),
        ],
        global: true,
        ..BehaviorModule::default()
    }
}

fn entity_props<'a>(accessor: &'a StateAccessor, entity: &EntityRef) -> Option<&'a skein_data::value::Props> {
    match entity {
        EntityRef::Item(id) => accessor.get_item(id).map(|i| &i.properties),
        EntityRef::Actor(id) => accessor.get_actor(id).map(|a| &a.properties),
        EntityRef::Location(id) => accessor.get_location(id).map(|l| &l.properties),
        EntityRef::Lock(_) => None,
    }
}

fn reaction_config(accessor: &StateAccessor, entity: &EntityRef, key: &str) -> Option<Value> {
    entity_props(accessor, entity).and_then(|props| props.get(key)).cloned()
}

/// Resolve and run a configured handler. `None` when no handler is named
/// or it fails to resolve (the caller then runs its data-driven pass).
fn try_handler(
    accessor: &mut StateAccessor,
    entity: &EntityRef,
    config: &Value,
    context: &EventContext,
) -> Option<Verdict> {
    let path = config.get("handler").and_then(Value::as_str)?;
    let handler = accessor.manager().resolve_named_handler(path)?;
    Some(handler(entity, accessor, context))
}

/// Condition gates shared by every dispatcher.
fn gates_pass(accessor: &StateAccessor, entity: &EntityRef, reaction: &Value) -> bool {
    if let Some(Value::Map(required)) = reaction.get("requires_flags") {
        for (flag, expected) in required {
            if accessor.state.flag(flag) != Some(expected) {
                return false;
            }
        }
    }
    for flag in reaction.get("forbidden_flags").map(Value::as_str_list).unwrap_or_default() {
        if accessor.state.flag_set(flag) {
            return false;
        }
    }
    if let Some(required_state) = reaction.get("requires_state").and_then(Value::as_str) {
        let current = match entity {
            EntityRef::Actor(id) => accessor
                .get_actor(id)
                .and_then(|a| a.state_machine())
                .map(|m| m.current),
            _ => None,
        };
        if current.as_deref() != Some(required_state) {
            return false;
        }
    }
    true
}

fn item_accepted(reaction: &Value, item_id: &str) -> bool {
    let accepted = reaction.get("accepted_items").map(Value::as_str_list).unwrap_or_default();
    if accepted.is_empty() {
        return false;
    }
    let item_lower = item_id.to_lowercase();
    accepted.iter().any(|accepted| item_lower.contains(&accepted.to_lowercase()))
}

/// Apply a matched reaction's effects. Returns its feedback message.
fn apply_effects(accessor: &mut StateAccessor, entity: &EntityRef, reaction: &Value) -> Option<String> {
    if let Some(Value::Map(flags)) = reaction.get("set_flags") {
        for (flag, value) in flags.clone() {
            accessor.state.set_flag(&flag, value);
        }
    }

    if let EntityRef::Actor(actor_id) = entity {
        if let Some(delta) = reaction.get("trust_delta").and_then(Value::as_int) {
            if delta != 0 {
                apply_trust_change(accessor, actor_id, delta, reaction.get("trust_transitions"));
            }
        }
        if let Some(new_state) = reaction.get("transition_to").and_then(Value::as_str) {
            let new_state = new_state.to_string();
            set_actor_state(accessor, actor_id, &new_state);
        }
    }

    if let Some(commitment_id) = reaction.get("create_commitment").and_then(Value::as_str) {
        let commitment_id = commitment_id.to_string();
        let now = accessor.current_turn();
        create_commitment(accessor.state, &commitment_id, now);
    }

    if let Some(gossip) = reaction.get("create_gossip") {
        queue_gossip_from_config(accessor, entity.id_str(), gossip);
    }

    reaction
        .get("response")
        .or_else(|| reaction.get("message"))
        .or_else(|| reaction.get("feedback"))
        .and_then(Value::as_str)
        .filter(|msg| !msg.is_empty())
        .map(str::to_string)
}

fn queue_gossip_from_config(accessor: &mut StateAccessor, about: &str, config: &Value) {
    let content = config
        .get("content")
        .and_then(Value::as_str)
        .map_or_else(|| format!("{about} has died"), str::to_string);
    let source = config
        .get("source")
        .and_then(Value::as_str)
        .unwrap_or("witnesses")
        .to_string();
    let targets: Vec<ActorId> = config
        .get("targets")
        .map(Value::as_str_list)
        .unwrap_or_default()
        .into_iter()
        .map(ActorId::from)
        .collect();
    let delay = config
        .get("delay")
        .and_then(Value::as_int)
        .and_then(|d| u64::try_from(d).ok())
        .unwrap_or(10);
    let id = config
        .get("id")
        .and_then(Value::as_str)
        .map_or_else(|| format!("gossip_{about}_death"), str::to_string);
    create_gossip(accessor.state, &content, &source, targets, delay, &id);
}

/// Walk named reactions in declaration order; the first that matches wins.
fn first_matching_reaction(
    accessor: &mut StateAccessor,
    entity: &EntityRef,
    config: &Value,
    matches: impl Fn(&StateAccessor, &EntityRef, &Value) -> bool,
    context: &EventContext,
) -> Verdict {
    let Some(reactions) = config.as_map() else {
        return Verdict::Handled { feedback: None };
    };
    for (name, reaction) in reactions {
        if name == "handler" || name == "_metadata" {
            continue;
        }
        if !matches!(reaction, Value::Map(_)) {
            continue;
        }
        if !matches(accessor, entity, reaction) {
            continue;
        }
        if !gates_pass(accessor, entity, reaction) {
            continue;
        }
        // a per-reaction handler overrides the declarative effects
        if let Some(verdict) = try_handler(accessor, entity, reaction, context) {
            return verdict;
        }
        let feedback = apply_effects(accessor, entity, reaction);
        return Verdict::Handled { feedback };
    }
    Verdict::Handled { feedback: None }
}

// ---- the dispatchers ----

/// Gift reactions: specific offered items drive trust and state.
fn on_gift_given(entity: &EntityRef, accessor: &mut StateAccessor, context: &EventContext) -> Verdict {
    let Some(config) = reaction_config(accessor, entity, "gift_reactions") else {
        return Verdict::Pass;
    };
    if let Some(verdict) = try_handler(accessor, entity, &config, context) {
        return verdict;
    }
    let item_id = context.extra_str("item_id").unwrap_or_default().to_string();
    first_matching_reaction(
        accessor,
        entity,
        &config,
        move |_, _, reaction| item_accepted(reaction, &item_id),
        context,
    )
}

/// Trades: an actor with a `trades` config swaps a configured reward for
/// the given item; a missing reward gets the configured apology.
fn on_receive_item(entity: &EntityRef, accessor: &mut StateAccessor, context: &EventContext) -> Verdict {
    let EntityRef::Actor(recipient_id) = entity else {
        return Verdict::Pass;
    };
    let Some(trades) = reaction_config(accessor, entity, "trades") else {
        return Verdict::Pass;
    };
    let given = context.extra_str("item_id").unwrap_or_default().to_string();
    let giver = context.extra_str("giver_id").map(ActorId::from);
    let recipient_name = accessor
        .get_actor(recipient_id)
        .map(|a| a.name.clone())
        .unwrap_or_default();

    let Some(deal) = trades.get(&given) else {
        let given_name = accessor
            .get_item(&ItemId::from(given.as_str()))
            .map(|i| i.name.clone())
            .unwrap_or(given);
        return Verdict::say(format!("{recipient_name} accepts the {given_name}."));
    };

    let Some(reward_id) = deal.get("gives").and_then(Value::as_str).map(ItemId::from) else {
        return Verdict::say(format!("{recipient_name} accepts it with a nod."));
    };
    let holds_reward = accessor
        .get_actor(recipient_id)
        .is_some_and(|actor| actor.inventory.contains(&reward_id));
    if !holds_reward {
        let apology = deal
            .get("missing_message")
            .and_then(Value::as_str)
            .map_or_else(
                || format!("{recipient_name} is unable to provide anything in return."),
                str::to_string,
            );
        return Verdict::say(apology);
    }
    let Some(giver) = giver else {
        return Verdict::say(format!("{recipient_name} accepts it with a nod."));
    };

    // hand the reward over: location plus both inventories
    let mut move_changes = BTreeMap::new();
    move_changes.insert("location".to_string(), Value::from(giver.as_str()));
    accessor.update(&EntityRef::Item(reward_id.clone()), &move_changes, None, None);
    let mut remove = BTreeMap::new();
    remove.insert("-inventory".to_string(), Value::from(reward_id.as_str()));
    accessor.update(&EntityRef::Actor(recipient_id.clone()), &remove, None, None);
    let mut add = BTreeMap::new();
    add.insert("+inventory".to_string(), Value::from(reward_id.as_str()));
    accessor.update(&EntityRef::Actor(giver), &add, None, None);

    let reward_name = accessor
        .get_item(&reward_id)
        .map(|i| i.name.clone())
        .unwrap_or_default();
    let message = deal.get("message").and_then(Value::as_str).map_or_else(
        || format!("{recipient_name} hands you the {reward_name} in return."),
        str::to_string,
    );
    Verdict::say(message)
}

/// Keyword reactions outside the topic engine.
fn on_dialog_received(entity: &EntityRef, accessor: &mut StateAccessor, context: &EventContext) -> Verdict {
    let Some(config) = reaction_config(accessor, entity, "dialog_reactions") else {
        return Verdict::Pass;
    };
    if let Some(verdict) = try_handler(accessor, entity, &config, context) {
        return verdict;
    }
    let keyword = context.extra_str("keyword").unwrap_or_default().to_lowercase();
    let dialog_text = context.extra_str("dialog_text").unwrap_or_default().to_lowercase();
    let full_text = format!("{keyword} {dialog_text}");

    first_matching_reaction(
        accessor,
        entity,
        &config,
        move |_, _, reaction| {
            let triggers = reaction.get("triggers").map(Value::as_str_list).unwrap_or_default();
            !triggers.is_empty() && triggers.iter().any(|t| full_text.contains(&t.to_lowercase()))
        },
        context,
    )
}

/// Reactions to `use X on Y`, keyed on the target (or the item itself).
fn on_item_used(entity: &EntityRef, accessor: &mut StateAccessor, context: &EventContext) -> Verdict {
    let Some(config) = reaction_config(accessor, entity, "item_use_reactions") else {
        return Verdict::Pass;
    };
    if let Some(verdict) = try_handler(accessor, entity, &config, context) {
        return verdict;
    }
    let used = context.extra_str("used_item").unwrap_or_default().to_string();
    first_matching_reaction(
        accessor,
        entity,
        &config,
        move |_, _, reaction| item_accepted(reaction, &used),
        context,
    )
}

/// Death consequences: flags, gossip, trust shifts and state changes on
/// named bystanders.
fn on_entity_death(entity: &EntityRef, accessor: &mut StateAccessor, context: &EventContext) -> Verdict {
    let Some(config) = reaction_config(accessor, entity, "death_reactions") else {
        return Verdict::Pass;
    };
    if let Some(verdict) = try_handler(accessor, entity, &config, context) {
        return verdict;
    }

    if let Some(Value::Map(flags)) = config.get("set_flags") {
        for (flag, value) in flags.clone() {
            accessor.state.set_flag(&flag, value);
        }
    }
    if let Some(gossip) = config.get("create_gossip") {
        queue_gossip_from_config(accessor, entity.id_str(), gossip);
    }
    if let Some(Value::Map(trust_changes)) = config.get("trust_changes").cloned() {
        for (target, delta) in &trust_changes {
            if let Some(delta) = delta.as_int() {
                apply_trust_change(accessor, &ActorId::from(target.as_str()), delta, None);
            }
        }
    }
    if let Some(Value::Map(state_changes)) = config.get("trigger_state_changes").cloned() {
        for (target, new_state) in &state_changes {
            if let Some(new_state) = new_state.as_str() {
                set_actor_state(accessor, &ActorId::from(target.as_str()), new_state);
            }
        }
    }

    let message = config
        .get("message")
        .and_then(Value::as_str)
        .filter(|msg| !msg.is_empty())
        .map(str::to_string);
    Verdict::Handled { feedback: message }
}

/// Pack mirroring: when a leader's state machine changes, every follower
/// named in `pack_behavior.followers` follows it, creating the state
/// entry (or the whole machine) if missing.
fn on_leader_state_change(entity: &EntityRef, accessor: &mut StateAccessor, context: &EventContext) -> Verdict {
    let Some(config) = reaction_config(accessor, entity, "pack_behavior") else {
        return Verdict::Pass;
    };
    let Some(new_state) = context.extra_str("new_state") else {
        return Verdict::Pass;
    };
    let new_state = new_state.to_string();
    let followers: Vec<ActorId> = config
        .get("followers")
        .map(Value::as_str_list)
        .unwrap_or_default()
        .into_iter()
        .map(ActorId::from)
        .collect();

    for follower_id in followers {
        let Some(follower) = accessor.state.get_actor_mut(&follower_id) else {
            warn!("pack follower '{follower_id}' not found");
            continue;
        };
        let mut machine = follower
            .state_machine()
            .unwrap_or_else(|| StateMachine {
                states: vec![new_state.clone()],
                initial: new_state.clone(),
                current: new_state.clone(),
            });
        machine.transition(&new_state);
        follower
            .properties
            .insert("state_machine".to_string(), machine.to_value());
    }
    Verdict::ok()
}

/// First-contact reactions, e.g. an NPC recognizing a mark the player
/// carries and docking trust immediately.
fn on_first_meeting(entity: &EntityRef, accessor: &mut StateAccessor, context: &EventContext) -> Verdict {
    let Some(config) = reaction_config(accessor, entity, "encounter_reactions") else {
        return Verdict::Pass;
    };
    if let Some(verdict) = try_handler(accessor, entity, &config, context) {
        return verdict;
    }
    first_matching_reaction(accessor, entity, &config, |_, _, _| true, context)
}

/// Regional turn phase: the player's location applies its configured
/// effects, then the player's conditions progress.
fn on_regional_turn(entity: &EntityRef, accessor: &mut StateAccessor, context: &EventContext) -> Verdict {
    let mut beats: Vec<String> = Vec::new();
    let player_id = ActorId::player();

    if let Some(config) = reaction_config(accessor, entity, "turn_phase_effects") {
        match try_handler(accessor, entity, &config, context) {
            Some(Verdict::Handled { feedback }) => {
                if let Some(feedback) = feedback {
                    beats.push(feedback);
                }
            },
            Some(Verdict::Veto { feedback }) => {
                return Verdict::Veto { feedback };
            },
            Some(Verdict::Pass) | None => {
                beats.extend(apply_turn_effects(accessor, &player_id, &config));
            },
        }
    }

    beats.extend(progress_conditions(accessor, &player_id));

    if beats.is_empty() {
        Verdict::ok()
    } else {
        Verdict::say(beats.join("\n"))
    }
}

fn apply_turn_effects(accessor: &mut StateAccessor, player_id: &ActorId, config: &Value) -> Vec<String> {
    let mut beats = Vec::new();

    if let Some(damage) = config.get("spore_damage").and_then(Value::as_int) {
        if damage > 0 {
            let (_, died) = apply_damage(accessor, player_id, damage, "spores");
            beats.push("Spores sting your lungs.".to_string());
            if died {
                beats.push("The spores overwhelm you.".to_string());
            }
        }
    }
    if let Some(damage) = config.get("cold_damage").and_then(Value::as_int) {
        if damage > 0 {
            let warmed = accessor
                .get_actor(player_id)
                .is_some_and(|player| player.prop_bool("warm"));
            if !warmed {
                let (_, died) = apply_damage(accessor, player_id, damage, "cold");
                beats.push("The cold gnaws at you.".to_string());
                if died {
                    beats.push("The cold takes you.".to_string());
                }
            }
        }
    }
    if config.get("light_decay").is_some_and(Value::truthy) {
        beats.extend(decay_carried_lights(accessor, player_id));
    }
    if let Some(message) = config.get("message").and_then(Value::as_str) {
        if !message.is_empty() {
            beats.push(message.to_string());
        }
    }
    beats
}

/// Lit light sources burn down one step per turn; at zero they go out.
fn decay_carried_lights(accessor: &mut StateAccessor, player_id: &ActorId) -> Vec<String> {
    let mut beats = Vec::new();
    let carried: Vec<ItemId> = accessor
        .get_actor(player_id)
        .map(|player| player.inventory.clone())
        .unwrap_or_default();
    for item_id in carried {
        let Some(item) = accessor.state.get_item_mut(&item_id) else {
            continue;
        };
        if !item.prop_bool("lit") {
            continue;
        }
        let remaining = item.prop_int("light_remaining").unwrap_or(0);
        if remaining > 1 {
            item.properties
                .insert("light_remaining".to_string(), Value::Int(remaining - 1));
        } else {
            item.properties.insert("light_remaining".to_string(), Value::Int(0));
            item.properties.insert("lit".to_string(), Value::Bool(false));
            beats.push(format!("Your {} gutters out.", item.name));
        }
    }
    beats
}

/// Conditions worsen by one severity step per turn until their cap, and
/// deal their configured per-turn damage while present.
fn progress_conditions(accessor: &mut StateAccessor, player_id: &ActorId) -> Vec<String> {
    let mut beats = Vec::new();
    let Some(Value::List(conditions)) = accessor
        .get_actor(player_id)
        .and_then(|player| player.prop("conditions"))
        .cloned()
    else {
        return beats;
    };

    let mut updated = Vec::new();
    let mut damage_total = 0;
    for condition in conditions {
        let Value::Map(mut map) = condition else {
            updated.push(condition);
            continue;
        };
        let kind = map.get("type").and_then(Value::as_str).unwrap_or("affliction").to_string();
        let severity = map.get("severity").and_then(Value::as_int).unwrap_or(1);
        let max = map.get("max").and_then(Value::as_int).unwrap_or(severity);
        if severity < max {
            map.insert("severity".to_string(), Value::Int(severity + 1));
            beats.push(format!("Your {kind} worsens."));
        }
        if let Some(damage) = map.get("damage_per_turn").and_then(Value::as_int) {
            damage_total += damage.max(0);
        }
        updated.push(Value::Map(map));
    }
    if let Some(player) = accessor.state.get_actor_mut(player_id) {
        player.properties.insert("conditions".to_string(), Value::List(updated));
    }
    if damage_total > 0 {
        apply_damage(accessor, player_id, damage_total, "affliction");
    }
    beats
}
