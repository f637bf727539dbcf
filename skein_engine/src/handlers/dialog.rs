//! Dialog handlers: `ask <npc> about <topic>` and `talk to <npc>`.
//!
//! NPCs declare topics under `dialog_topics`. Each topic gates on player
//! flags, carried items, the NPC's state machine, and trust; discussing
//! one can set flags, unlock further topics, grant items, adjust trust
//! (with threshold transitions), and exhaust itself if `one_time`. A topic
//! may name a custom handler; a handler that speaks takes full ownership
//! of the exchange and the declarative effects are skipped.
//!
//! A keyword no topic claims falls through to the dialog-reaction
//! dispatcher, so reaction-only NPCs still answer.

use crate::accessor::StateAccessor;
use crate::action::{HandlerResult, NarrationData, ParsedAction};
use crate::behavior::{BehaviorModule, EventContext, HandlerFn};
use crate::handlers::{actor_and_location, display_name, require_object};
use crate::infra::apply_trust_change;
use crate::search::find_actor_by_name;
use crate::vocab::{VerbDef, Vocabulary};

use log::warn;
use skein_data::{Actor, ActorId, EntityRef, ItemId, Value};
use std::collections::BTreeMap;

pub fn module() -> BehaviorModule {
    BehaviorModule {
        path: "core.dialog",
        vocabulary: Vocabulary {
            verbs: vec![
                VerbDef::new("ask").with_synonyms(&["question"]).requires_object(),
                VerbDef::new("talk").with_synonyms(&["speak", "chat"]).requires_object(),
            ],
            prepositions: vec!["about".into(), "with".into()],
            ..Vocabulary::default()
        },
        handlers: vec![
            ("ask", handle_ask as HandlerFn),
            ("talk", handle_talk as HandlerFn),
        ],
        ..BehaviorModule::default()
    }
}

/// Topics the NPC can currently discuss, in declaration order.
pub fn available_topics(accessor: &StateAccessor, npc: &Actor) -> Vec<String> {
    let Some(player) = accessor.player() else {
        return Vec::new();
    };
    let Some(Value::Map(topics)) = npc.prop("dialog_topics") else {
        return Vec::new();
    };
    let discussed: Vec<&str> = npc
        .prop("discussed_topics")
        .map(Value::as_str_list)
        .unwrap_or_default();

    let mut available = Vec::new();
    for (topic_name, topic) in topics {
        let Value::Map(topic) = topic else {
            continue; // skip non-topic keys such as "handler"
        };

        if let Some(Value::Map(required_flags)) = topic.get("requires_flags") {
            let met = required_flags
                .iter()
                .all(|(flag, expected)| player.flag(flag) == Some(expected));
            if !met {
                continue;
            }
        }
        if let Some(required_items) = topic.get("requires_items") {
            let met = required_items
                .as_str_list()
                .iter()
                .all(|item| player.inventory.contains(&ItemId::from(*item)));
            if !met {
                continue;
            }
        }
        if topic.get("one_time").is_some_and(Value::truthy) && discussed.contains(&topic_name.as_str()) {
            continue;
        }
        if let Some(requires_state) = topic.get("requires_state") {
            let Some(machine) = npc.state_machine() else {
                continue;
            };
            let ok = match requires_state {
                Value::Str(state) => machine.current == *state,
                Value::List(_) => requires_state.as_str_list().contains(&machine.current.as_str()),
                _ => true,
            };
            if !ok {
                continue;
            }
        }
        if let Some(min_trust) = topic.get("requires_trust").and_then(Value::as_int) {
            let current = npc.trust_state().map(|t| t.current).unwrap_or(0);
            if current < min_trust {
                continue;
            }
        }
        available.push(topic_name.clone());
    }
    available
}

/// One representative keyword per available topic, as conversation hints.
pub fn topic_hints(accessor: &StateAccessor, npc: &Actor) -> Vec<String> {
    let topics = npc.prop("dialog_topics").cloned().unwrap_or_default();
    available_topics(accessor, npc)
        .into_iter()
        .filter_map(|name| {
            topics
                .get(&name)
                .and_then(|topic| topic.get("keywords"))
                .and_then(|keywords| keywords.as_list())
                .and_then(|list| list.first())
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .collect()
}

fn find_topic_by_keyword(npc: &Actor, query: &str) -> Option<String> {
    let Some(Value::Map(topics)) = npc.prop("dialog_topics") else {
        return None;
    };
    let query = query.to_lowercase();
    for (topic_name, topic) in topics {
        if !matches!(topic, Value::Map(_)) {
            continue;
        }
        let keywords = topic.get("keywords").map(Value::as_str_list).unwrap_or_default();
        for keyword in keywords {
            let keyword = keyword.to_lowercase();
            if keyword.contains(&query) || query.contains(&keyword) {
                return Some(topic_name.clone());
            }
        }
    }
    None
}

fn default_topic_reply(npc: &Actor) -> String {
    npc.prop_str("default_topic_summary")
        .map(str::to_string)
        .unwrap_or_else(|| format!("{} doesn't know about that.", npc.name))
}

/// Ask an NPC about something.
pub fn handle_ask(accessor: &mut StateAccessor, action: &ParsedAction) -> HandlerResult {
    let (actor_id, _) = match actor_and_location(accessor, action) {
        Ok(pair) => pair,
        Err(failure) => return failure,
    };
    let object = match require_object(action, "Ask whom?") {
        Ok(word) => word,
        Err(failure) => return failure,
    };
    let Some(topic_word) = action.indirect_object.as_ref() else {
        return HandlerResult::failure("Ask about what?".to_string());
    };
    let topic_text = topic_word.word.clone();

    let Some(npc_id) = find_actor_by_name(accessor, object, &actor_id) else {
        return HandlerResult::failure(format!("You don't see any {} here.", display_name(Some(object), None)));
    };
    let npc = accessor.get_actor(&npc_id).expect("npc was just found").clone();

    let matched = find_topic_by_keyword(&npc, &topic_text)
        .filter(|name| available_topics(accessor, &npc).contains(name));

    let Some(topic_name) = matched else {
        // no topic claims the keyword: give dialog reactions a chance
        let context = EventContext {
            actor_id: Some(actor_id.clone()),
            ..EventContext::default()
        }
        .with_extra("keyword", topic_text.as_str())
        .with_extra("dialog_text", action.raw_input.as_str());
        let reaction = accessor.invoke_behavior(&EntityRef::Actor(npc_id.clone()), "on_dialog_received", &context);
        if let Some(feedback) = reaction.feedback {
            return HandlerResult::success(feedback)
                .with_data(NarrationData::for_entity(npc_id.as_str(), npc.llm_context()));
        }
        return HandlerResult::success(default_topic_reply(&npc));
    };

    let topic = npc
        .prop("dialog_topics")
        .and_then(|topics| topics.get(&topic_name))
        .cloned()
        .unwrap_or_default();

    // handler escape hatch: feedback from the handler ends the exchange
    if let Some(handler_path) = topic.get("handler").and_then(Value::as_str) {
        if let Some(handler) = accessor.manager().resolve_named_handler(handler_path) {
            let context = EventContext {
                actor_id: Some(actor_id.clone()),
                ..EventContext::default()
            }
            .with_extra("keyword", topic_text.as_str())
            .with_extra("topic_name", topic_name.as_str());
            let verdict = handler(&EntityRef::Actor(npc_id.clone()), accessor, &context);
            match verdict {
                crate::behavior::Verdict::Handled { feedback: Some(feedback) } => {
                    return HandlerResult::success(feedback)
                        .with_data(NarrationData::for_entity(npc_id.as_str(), npc.llm_context()));
                },
                crate::behavior::Verdict::Veto { feedback } => {
                    return HandlerResult::failure(feedback.unwrap_or_else(|| default_topic_reply(&npc)));
                },
                _ => {}, // no feedback: fall through to declarative effects
            }
        } else {
            warn!("topic handler failed to load for {npc_id}.{topic_name}: {handler_path}");
        }
    }

    apply_topic_effects(accessor, &npc_id, &topic_name, &topic);

    let summary = topic
        .get("summary")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{} discusses {topic_name}.", npc.name));
    HandlerResult::success(summary).with_data(NarrationData::for_entity(npc_id.as_str(), npc.llm_context()))
}

/// The declarative side of a discussed topic.
fn apply_topic_effects(accessor: &mut StateAccessor, npc_id: &ActorId, topic_name: &str, topic: &Value) {
    let player_id = ActorId::player();

    if let Some(Value::Map(sets_flags)) = topic.get("sets_flags") {
        if let Some(player) = accessor.state.player_mut() {
            for (flag, value) in sets_flags {
                player.set_flag(flag, value.clone());
            }
        }
    }

    let unlocks = topic.get("unlocks_topics").map(Value::as_str_list).unwrap_or_default();
    for unlock in unlocks {
        let mut changes = BTreeMap::new();
        changes.insert("+unlocked_topics".to_string(), Value::from(unlock));
        let already = accessor
            .get_actor(npc_id)
            .and_then(|npc| npc.prop("unlocked_topics"))
            .map(Value::as_str_list)
            .unwrap_or_default()
            .contains(&unlock);
        if !already {
            accessor.update(&EntityRef::Actor(npc_id.clone()), &changes, None, None);
        }
    }

    let grants = topic.get("grants_items").map(Value::as_str_list).unwrap_or_default();
    for item in grants {
        let item_id = ItemId::from(item);
        if accessor.get_item(&item_id).is_none() {
            warn!("topic '{topic_name}' grants unknown item '{item}'");
            continue;
        }
        let mut move_changes = BTreeMap::new();
        move_changes.insert("location".to_string(), Value::from(player_id.as_str()));
        accessor.update(&EntityRef::Item(item_id.clone()), &move_changes, None, None);
        let mut inv_changes = BTreeMap::new();
        inv_changes.insert("+inventory".to_string(), Value::from(item));
        accessor.update(&EntityRef::Actor(player_id.clone()), &inv_changes, None, None);
    }

    if topic.get("one_time").is_some_and(Value::truthy) {
        let mut changes = BTreeMap::new();
        changes.insert("+discussed_topics".to_string(), Value::from(topic_name));
        accessor.update(&EntityRef::Actor(npc_id.clone()), &changes, None, None);
    }

    if let Some(delta) = topic.get("trust_delta").and_then(Value::as_int) {
        if delta != 0 {
            apply_trust_change(accessor, npc_id, delta, topic.get("trust_transitions"));
        }
    }
}

/// General talk: hint at what the NPC will discuss.
pub fn handle_talk(accessor: &mut StateAccessor, action: &ParsedAction) -> HandlerResult {
    let (actor_id, _) = match actor_and_location(accessor, action) {
        Ok(pair) => pair,
        Err(failure) => return failure,
    };
    let object = match require_object(action, "Talk to whom?") {
        Ok(word) => word,
        Err(failure) => return failure,
    };
    let Some(npc_id) = find_actor_by_name(accessor, object, &actor_id) else {
        return HandlerResult::failure(format!("You don't see any {} here.", display_name(Some(object), None)));
    };
    let npc = accessor.get_actor(&npc_id).expect("npc was just found").clone();

    let hints = topic_hints(accessor, &npc);
    if hints.is_empty() {
        return HandlerResult::success(format!("{} has nothing to discuss right now.", npc.name));
    }
    HandlerResult::success(format!("You could ask {} about: {}.", npc.name, hints.join(", ")))
        .with_data(NarrationData::for_entity(npc_id.as_str(), npc.llm_context()))
}
