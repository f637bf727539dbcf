//! The game engine: wiring and the per-turn pipeline.
//!
//! A turn is the atomic unit of progress, processed single-threaded:
//! advance the turn counter, route the verb to its handler, then run the
//! turn phases in fixed order — commitments tick, gossip delivery, the
//! regional turn for the player's location, and NPC morale/flee checks —
//! and wrap everything in a [`TurnReport`] for the narrator. Given the
//! same world, the same commands, and the same seed, the run is
//! deterministic.

use crate::accessor::StateAccessor;
use crate::action::{HandlerResult, ParsedAction, TurnReport};
use crate::behavior::{BehaviorManager, BehaviorModule, EventContext};
use crate::commitments::tick_commitments;
use crate::gossip::deliver_gossip;
use crate::morale::{attempt_flee, check_flee_condition};
use crate::parser::{Parser, ParserContext};
use crate::rng::TurnRng;
use crate::vocab::VocabError;
use crate::{behaviors_core, handlers, reactions};

use anyhow::{Context, Result};
use log::{info, warn};
use skein_data::{ActorId, EntityRef, GameState, schema};
use std::path::Path;

/// Every behavior module the core ships: command handler modules, the
/// per-entity core behaviors, and the global reaction dispatchers.
pub fn core_module_registry() -> Vec<BehaviorModule> {
    let mut modules = vec![
        handlers::manipulation::module(),
        handlers::interaction::module(),
        handlers::locks::module(),
        handlers::movement::module(),
        handlers::perception::module(),
        handlers::spatial::module(),
        handlers::consumables::module(),
        handlers::dialog::module(),
    ];
    modules.extend(behaviors_core::modules());
    modules.push(reactions::module());
    modules
}

/// Owns the world, the behavior manager, and the turn rng.
pub struct GameEngine {
    pub state: GameState,
    pub manager: BehaviorManager,
    pub rng: TurnRng,
}

impl GameEngine {
    /// Build an engine over an already-validated world.
    ///
    /// # Errors
    /// [`VocabError`] if the core module registry fails to merge (a build
    /// defect, not a content problem).
    pub fn new(state: GameState, seed: u64) -> Result<Self, VocabError> {
        let manager = BehaviorManager::new(core_module_registry())?;
        info!("engine ready: '{}' (seed {seed})", state.metadata.title);
        Ok(Self {
            state,
            manager,
            rng: TurnRng::seeded(seed),
        })
    }

    /// Load `world.json` from a game directory and build an engine.
    pub fn from_dir(dir: impl AsRef<Path>, seed: u64) -> Result<Self> {
        let world_path = dir.as_ref().join("world.json");
        let state = schema::load_game_state(&world_path)
            .with_context(|| format!("while loading world from {}", world_path.display()))?;
        Self::new(state, seed).context("while building the behavior registry")
    }

    /// Persist the world to a save file. The saved form is the same
    /// schema the loader accepts.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let doc = schema::serialize_game_state(&self.state);
        let text = serde_json::to_string_pretty(&doc)?;
        std::fs::write(path.as_ref(), text)
            .with_context(|| format!("while writing save file {}", path.as_ref().display()))?;
        info!("world saved to {}", path.as_ref().display());
        Ok(())
    }

    /// Context for the parser: what the player can currently see.
    pub fn parser_context(&self) -> ParserContext {
        let mut context = ParserContext::default();
        let Some(player) = self.state.player() else {
            return context;
        };
        context.inventory = player.inventory.iter().map(|id| id.0.clone()).collect();
        if let Some(location) = self.state.get_location(&player.location) {
            context.location_objects = self
                .state
                .items_in_location(&location.id)
                .iter()
                .map(|item| item.id.0.clone())
                .chain(
                    self.state
                        .actors_in_location(&location.id)
                        .iter()
                        .filter(|actor| !actor.is_player())
                        .map(|actor| actor.id.0.clone()),
                )
                .collect();
            context.exits = location.exits.keys().cloned().collect();
        }
        context
    }

    /// Parse raw input against the merged vocabulary.
    pub fn parse(&self, input: &str) -> Option<ParsedAction> {
        Parser::new(self.manager.vocabulary()).parse(input, &self.parser_context())
    }

    /// Process one player turn: handler, turn counter, phases, report.
    pub fn process_turn(&mut self, action: &ParsedAction) -> TurnReport {
        let verb = action.verb.clone();
        let Some(handler) = self.manager.handler_for(&verb) else {
            // the parser gates verbs, so this is a wiring defect
            warn!("no handler for verb '{verb}'");
            return TurnReport {
                action: verb.clone(),
                success: false,
                verbosity: self.manager.vocabulary().narration_mode(&verb),
                narration: HandlerResult::failure("You can't do that."),
                phase_beats: Vec::new(),
                turn: self.state.turn,
            };
        };

        // the counter advances first so the handler, its reactions, and
        // the phases all observe the same turn number
        self.state.turn += 1;
        let narration = {
            let mut accessor = StateAccessor::new(&mut self.state, &self.manager);
            handler(&mut accessor, action)
        };
        let phase_beats = self.run_turn_phases();

        TurnReport {
            action: verb.clone(),
            success: narration.success,
            verbosity: self.manager.vocabulary().narration_mode(&verb),
            narration,
            phase_beats,
            turn: self.state.turn,
        }
    }

    /// The fixed post-handler phase order.
    fn run_turn_phases(&mut self) -> Vec<String> {
        let mut beats = Vec::new();

        {
            let mut accessor = StateAccessor::new(&mut self.state, &self.manager);
            beats.extend(tick_commitments(&mut accessor));
            beats.extend(deliver_gossip(&mut accessor));
        }
        beats.extend(self.run_regional_turn());
        beats.extend(self.run_flee_checks());
        beats
    }

    fn run_regional_turn(&mut self) -> Vec<String> {
        let Some(location_id) = self.state.player().map(|p| p.location.clone()) else {
            return Vec::new();
        };
        let mut accessor = StateAccessor::new(&mut self.state, &self.manager);
        let result = accessor.invoke_behavior(
            &EntityRef::Location(location_id),
            "on_regional_turn",
            &EventContext::default(),
        );
        result.feedback.into_iter().collect()
    }

    /// Morale checks for every living NPC; shaken ones try to run. Only
    /// flights the player can see become narration.
    fn run_flee_checks(&mut self) -> Vec<String> {
        let player_location = self.state.player().map(|p| p.location.clone());
        let npc_ids: Vec<ActorId> = self
            .state
            .actors
            .values()
            .filter(|actor| !actor.is_player() && !actor.prop_bool("dead"))
            .map(|actor| actor.id.clone())
            .collect();

        let mut beats = Vec::new();
        for npc_id in npc_ids {
            let (should_flee, from_location) = {
                let accessor = StateAccessor::new(&mut self.state, &self.manager);
                let Some(npc) = accessor.get_actor(&npc_id) else {
                    continue;
                };
                (check_flee_condition(&accessor, npc), npc.location.clone())
            };
            if !should_flee {
                continue;
            }
            let mut accessor = StateAccessor::new(&mut self.state, &self.manager);
            let result = attempt_flee(&mut accessor, &npc_id, &mut self.rng, None);
            if Some(&from_location) == player_location.as_ref() {
                beats.push(result.narration);
            }
        }
        beats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Verbosity;
    use skein_data::{Actor, Item, ItemId, Location, LocationId, Metadata, Value};

    fn tiny_world() -> GameState {
        let mut state = GameState {
            metadata: Metadata {
                title: "Tiny".into(),
                start_location: LocationId::from("loc_hall"),
                ..Metadata::default()
            },
            ..GameState::default()
        };
        let mut hall = Location {
            id: LocationId::from("loc_hall"),
            name: "Hall".into(),
            description: "A bare hall.".into(),
            ..Location::default()
        };
        hall.items.push(ItemId::from("item_coin"));
        state.locations.insert(hall.id.clone(), hall);
        state.items.insert(
            ItemId::from("item_coin"),
            Item {
                id: ItemId::from("item_coin"),
                name: "coin".into(),
                description: "A copper coin.".into(),
                portable: true,
                location: "loc_hall".into(),
                ..Item::default()
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
    fn core_registry_merges_cleanly() {
        assert!(BehaviorManager::new(core_module_registry()).is_ok());
    }

    #[test]
    fn a_turn_routes_parses_and_advances() {
        let mut engine = GameEngine::new(tiny_world(), 0).unwrap();
        let action = engine.parse("take coin").unwrap();
        let report = engine.process_turn(&action);

        assert!(report.success, "{}", report.narration.primary);
        assert_eq!(report.action, "take");
        assert_eq!(report.turn, 1);
        assert_eq!(engine.state.get_item(&ItemId::from("item_coin")).unwrap().location, "player");
    }

    #[test]
    fn verbosity_hint_follows_the_vocabulary() {
        let mut engine = GameEngine::new(tiny_world(), 0).unwrap();
        let take = engine.parse("take coin").unwrap();
        assert_eq!(engine.process_turn(&take).verbosity, Verbosity::Full);
        let drop = engine.parse("drop coin").unwrap();
        assert_eq!(engine.process_turn(&drop).verbosity, Verbosity::Brief);
    }

    #[test]
    fn unknown_verbs_do_not_parse() {
        let engine = GameEngine::new(tiny_world(), 0).unwrap();
        assert!(engine.parse("teleport home").is_none());
    }

    #[test]
    fn regional_effects_run_each_turn() {
        let mut state = tiny_world();
        state
            .locations
            .get_mut(&LocationId::from("loc_hall"))
            .unwrap()
            .properties
            .insert("turn_phase_effects".into(), skein_data::value_map! { "spore_damage" => 2 });
        state
            .player_mut()
            .unwrap()
            .properties
            .insert("health".into(), Value::Int(50));

        let mut engine = GameEngine::new(state, 0).unwrap();
        let action = engine.parse("look").unwrap();
        let report = engine.process_turn(&action);
        assert!(report.phase_beats.iter().any(|b| b.contains("Spores")));
        assert_eq!(engine.state.player().unwrap().prop_int("health"), Some(48));
    }

    #[test]
    fn identical_seeds_replay_identically() {
        let build = || {
            let mut state = tiny_world();
            state.locations.insert(
                LocationId::from("loc_exit"),
                Location {
                    id: LocationId::from("loc_exit"),
                    name: "Exit".into(),
                    ..Location::default()
                },
            );
            state
                .locations
                .get_mut(&LocationId::from("loc_hall"))
                .unwrap()
                .exits
                .insert(
                    "north".into(),
                    skein_data::ExitDef {
                        to: Some(LocationId::from("loc_exit")),
                        ..skein_data::ExitDef::default()
                    },
                );
            // a shaken goblin who flees on a coin flip
            let mut goblin = Actor {
                id: ActorId::from("npc_goblin"),
                name: "goblin".into(),
                location: LocationId::from("loc_hall"),
                ..Actor::default()
            };
            goblin.properties.insert("disposition".into(), Value::from("hostile"));
            goblin.properties.insert("health".into(), Value::Int(5));
            goblin.properties.insert("max_health".into(), Value::Int(100));
            state.actors.insert(goblin.id.clone(), goblin);
            GameEngine::new(state, 42).unwrap()
        };

        let mut first = build();
        let mut second = build();
        for _ in 0..4 {
            let a = first.parse("look").unwrap();
            let b = second.parse("look").unwrap();
            let report_a = first.process_turn(&a);
            let report_b = second.process_turn(&b);
            assert_eq!(report_a, report_b);
        }
        assert_eq!(
            skein_data::serialize_game_state(&first.state),
            skein_data::serialize_game_state(&second.state)
        );
    }

    #[test]
    fn save_round_trips_through_the_loader() {
        let dir = tempfile::tempdir().unwrap();
        let engine = GameEngine::new(tiny_world(), 0).unwrap();
        let path = dir.path().join("save.json");
        engine.save_to(&path).unwrap();
        let restored = schema::load_game_state(&path).unwrap();
        assert_eq!(
            schema::serialize_game_state(&engine.state),
            schema::serialize_game_state(&restored)
        );
    }
}
