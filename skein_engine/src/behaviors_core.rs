//! Core per-entity behaviors.
//!
//! Worlds attach these by listing the module path in an entity's
//! `behaviors` array. They ride the events fired by the state accessor:
//! a potion healing on `on_drink`, food satisfying a need on `on_eat`, a
//! lantern toggling on `on_use`.

use crate::accessor::StateAccessor;
use crate::behavior::{BehaviorModule, EventContext, Verdict};
use crate::infra::apply_healing;
use crate::vocab::{EventDef, Vocabulary};

use log::info;
use skein_data::{ActorId, EntityRef, Value};

/// The core behavior module listing, merged into the engine registry.
pub fn modules() -> Vec<BehaviorModule> {
    vec![consumables_module(), light_sources_module()]
}

/// Healing drinks and need-satisfying food.
pub fn consumables_module() -> BehaviorModule {
    BehaviorModule {
        path: "core.consumables",
        vocabulary: Vocabulary {
            events: vec![
                EventDef {
                    event: "on_eat".into(),
                    description: "fired when an item is eaten".into(),
                },
                EventDef {
                    event: "on_drink".into(),
                    description: "fired when an item is drunk".into(),
                },
            ],
            ..Vocabulary::default()
        },
        events: vec![
            ("on_eat", on_eat as crate::behavior::BehaviorFn),
            ("on_drink", on_drink as crate::behavior::BehaviorFn),
        ],
        ..BehaviorModule::default()
    }
}

/// Drinking an item with a `heal_amount` restores the drinker, capped at
/// `max_health`.
fn on_drink(entity: &EntityRef, accessor: &mut StateAccessor, context: &EventContext) -> Verdict {
    let EntityRef::Item(item_id) = entity else {
        return Verdict::Pass;
    };
    let Some(heal) = accessor.get_item(item_id).and_then(|item| item.prop_int("heal_amount")) else {
        return Verdict::Pass;
    };
    let Some(drinker) = context.actor_id.clone() else {
        return Verdict::Pass;
    };
    let before = accessor
        .get_actor(&drinker)
        .and_then(|a| a.prop_int("health"))
        .unwrap_or(100);
    let after = apply_healing(accessor, &drinker, heal);
    if after > before {
        Verdict::say("Warmth spreads through you as your wounds close.")
    } else {
        Verdict::ok()
    }
}

/// Eating an item whose `satisfies` list covers one of the eater's needs
/// removes that need.
fn on_eat(entity: &EntityRef, accessor: &mut StateAccessor, context: &EventContext) -> Verdict {
    let EntityRef::Item(item_id) = entity else {
        return Verdict::Pass;
    };
    let satisfies: Vec<String> = accessor
        .get_item(item_id)
        .and_then(|item| item.prop("satisfies"))
        .map(|v| v.as_str_list().into_iter().map(str::to_string).collect())
        .unwrap_or_default();
    if satisfies.is_empty() {
        return Verdict::Pass;
    }
    let Some(eater) = context.actor_id.clone() else {
        return Verdict::Pass;
    };
    let mut sated = Vec::new();
    if let Some(actor) = accessor.state.get_actor_mut(&eater) {
        if let Some(Value::List(needs)) = actor.properties.get_mut("needs") {
            needs.retain(|need| {
                let keep = !need.as_str().is_some_and(|n| satisfies.iter().any(|s| s == n));
                if !keep {
                    if let Some(n) = need.as_str() {
                        sated.push(n.to_string());
                    }
                }
                keep
            });
        }
    }
    if sated.is_empty() {
        Verdict::ok()
    } else {
        info!("'{eater}' satisfied needs: {}", sated.join(", "));
        Verdict::say("That takes the edge off.")
    }
}

/// Light sources toggled by `use`.
pub fn light_sources_module() -> BehaviorModule {
    BehaviorModule {
        path: "core.light_sources",
        vocabulary: Vocabulary {
            events: vec![EventDef {
                event: "on_use".into(),
                description: "fired when an item is used".into(),
            }],
            ..Vocabulary::default()
        },
        events: vec![("on_use", on_use_light as crate::behavior::BehaviorFn)],
        ..BehaviorModule::default()
    }
}

fn on_use_light(entity: &EntityRef, accessor: &mut StateAccessor, _context: &EventContext) -> Verdict {
    let EntityRef::Item(item_id) = entity else {
        return Verdict::Pass;
    };
    let Some(item) = accessor.get_item(item_id) else {
        return Verdict::Pass;
    };
    if !item.prop_bool("provides_light") {
        return Verdict::Pass;
    }
    let name = item.name.clone();
    let lit = item.prop_bool("lit");
    if let Some(item) = accessor.state.get_item_mut(item_id) {
        item.properties.insert("lit".to_string(), Value::Bool(!lit));
    }
    if lit {
        Verdict::say(format!("You snuff the {name}."))
    } else {
        Verdict::say(format!("The {name} flares to life."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::BehaviorManager;
    use skein_data::{Actor, GameState, Item, ItemId, Location, LocationId, Metadata};

    fn world() -> GameState {
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
        state.actors.insert(
            ActorId::player(),
            Actor {
                id: ActorId::player(),
                name: "You".into(),
                location: LocationId::from("loc_hall"),
                ..Actor::default()
            },
        );
        state
    }

    #[test]
    fn drinking_a_healing_item_restores_health() {
        let manager = BehaviorManager::new(modules()).unwrap();
        let mut state = world();
        {
            let player = state.player_mut().unwrap();
            player.properties.insert("health".into(), Value::Int(40));
            player.properties.insert("max_health".into(), Value::Int(100));
        }
        state.items.insert(
            ItemId::from("item_potion"),
            Item {
                id: ItemId::from("item_potion"),
                name: "potion".into(),
                location: "player".into(),
                behaviors: vec!["core.consumables".into()],
                properties: [
                    ("drinkable".to_string(), Value::Bool(true)),
                    ("heal_amount".to_string(), Value::Int(75)),
                ]
                .into(),
                ..Item::default()
            },
        );
        state.player_mut().unwrap().inventory.push(ItemId::from("item_potion"));

        let mut accessor = StateAccessor::new(&mut state, &manager);
        let context = EventContext {
            actor_id: Some(ActorId::player()),
            ..EventContext::default()
        };
        let result = accessor.invoke_behavior(&EntityRef::Item(ItemId::from("item_potion")), "on_drink", &context);
        assert!(result.allow);
        assert!(result.feedback.unwrap().contains("Warmth"));
        // healing saturates at max_health
        assert_eq!(state.player().unwrap().prop_int("health"), Some(100));
    }

    #[test]
    fn eating_removes_a_satisfied_need() {
        let manager = BehaviorManager::new(modules()).unwrap();
        let mut state = world();
        state
            .player_mut()
            .unwrap()
            .properties
            .insert("needs".into(), Value::List(vec![Value::from("hunger"), Value::from("warmth")]));
        state.items.insert(
            ItemId::from("item_venison"),
            Item {
                id: ItemId::from("item_venison"),
                name: "venison".into(),
                location: "player".into(),
                behaviors: vec!["core.consumables".into()],
                properties: [
                    ("edible".to_string(), Value::Bool(true)),
                    ("satisfies".to_string(), Value::List(vec![Value::from("hunger")])),
                ]
                .into(),
                ..Item::default()
            },
        );
        state.player_mut().unwrap().inventory.push(ItemId::from("item_venison"));

        let mut accessor = StateAccessor::new(&mut state, &manager);
        let context = EventContext {
            actor_id: Some(ActorId::player()),
            ..EventContext::default()
        };
        let result = accessor.invoke_behavior(&EntityRef::Item(ItemId::from("item_venison")), "on_eat", &context);
        assert!(result.allow);
        assert_eq!(
            state.player().unwrap().prop("needs").unwrap().as_str_list(),
            vec!["warmth"]
        );
    }

    #[test]
    fn light_source_toggles_lit_state() {
        let manager = BehaviorManager::new(modules()).unwrap();
        let mut state = world();
        state.items.insert(
            ItemId::from("item_lantern"),
            Item {
                id: ItemId::from("item_lantern"),
                name: "lantern".into(),
                location: "loc_hall".into(),
                behaviors: vec!["core.light_sources".into()],
                properties: [("provides_light".to_string(), Value::Bool(true))].into(),
                ..Item::default()
            },
        );

        let mut accessor = StateAccessor::new(&mut state, &manager);
        let entity = EntityRef::Item(ItemId::from("item_lantern"));
        let lit = accessor.invoke_behavior(&entity, "on_use", &EventContext::default());
        assert!(lit.feedback.unwrap().contains("flares"));
        assert!(state.get_item(&ItemId::from("item_lantern")).unwrap().prop_bool("lit"));

        let mut accessor = StateAccessor::new(&mut state, &manager);
        let snuffed = accessor.invoke_behavior(&entity, "on_use", &EventContext::default());
        assert!(snuffed.feedback.unwrap().contains("snuff"));
        assert!(!state.get_item(&ItemId::from("item_lantern")).unwrap().prop_bool("lit"));
    }

    #[test]
    fn non_light_items_pass_through() {
        let manager = BehaviorManager::new(modules()).unwrap();
        let mut state = world();
        state.items.insert(
            ItemId::from("item_rock"),
            Item {
                id: ItemId::from("item_rock"),
                name: "rock".into(),
                location: "loc_hall".into(),
                behaviors: vec!["core.light_sources".into()],
                ..Item::default()
            },
        );
        let mut accessor = StateAccessor::new(&mut state, &manager);
        let result = accessor.invoke_behavior(&EntityRef::Item(ItemId::from("item_rock")), "on_use", &EventContext::default());
        assert!(result.allow);
        assert!(result.feedback.is_none());
    }

    #[test]
    fn multiple_declared_modules_coexist() {
        let manager = BehaviorManager::new(modules()).unwrap();
        let mut state = world();
        state.items.insert(
            ItemId::from("item_glowshroom"),
            Item {
                id: ItemId::from("item_glowshroom"),
                name: "glowshroom".into(),
                location: "player".into(),
                behaviors: vec!["core.consumables".into(), "core.light_sources".into()],
                properties: [
                    ("edible".to_string(), Value::Bool(true)),
                    ("satisfies".to_string(), Value::List(Vec::new())),
                ]
                .into(),
                ..Item::default()
            },
        );
        state.player_mut().unwrap().inventory.push(ItemId::from("item_glowshroom"));
        let mut accessor = StateAccessor::new(&mut state, &manager);
        let result = accessor.invoke_behavior(
            &EntityRef::Item(ItemId::from("item_glowshroom")),
            "on_eat",
            &EventContext {
                actor_id: Some(ActorId::player()),
                ..EventContext::default()
            },
        );
        assert!(result.allow);
    }
}
