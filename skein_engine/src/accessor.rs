//! The state accessor: the single chokepoint for reads and mutations.
//!
//! Handlers never touch [`GameState`] fields directly. They describe
//! changes as path → value maps and call [`StateAccessor::update`], which
//! validates every path, applies the changes, keeps the denormalized
//! location lists consistent, and fires the per-entity behavior chain for
//! the verb's event. A veto from a behavior rolls this update back and
//! surfaces the feedback, so the identity laws (take∘drop, open∘close)
//! hold whether or not behaviors intervene.

use crate::behavior::{BehaviorManager, EntitySnapshot, EventContext, EventResult};
use crate::paths;

use log::debug;
use skein_data::{Actor, ActorId, EntityRef, GameState, Item, ItemId, Location, LocationId, Lock, LockId, Value};
use std::collections::BTreeMap;

/// Outcome of an [`StateAccessor::update`] call. On failure `message`
/// explains the problem; on success it carries any behavior feedback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub success: bool,
    pub message: Option<String>,
}

impl UpdateResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    fn ok_with(message: Option<String>) -> Self {
        Self {
            success: true,
            message,
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Mediates every read and mutation handlers and behaviors make.
pub struct StateAccessor<'a> {
    pub state: &'a mut GameState,
    manager: &'a BehaviorManager,
}

impl<'a> StateAccessor<'a> {
    pub fn new(state: &'a mut GameState, manager: &'a BehaviorManager) -> Self {
        Self { state, manager }
    }

    pub fn manager(&self) -> &'a BehaviorManager {
        self.manager
    }

    // ---- typed reads ----

    pub fn get_actor(&self, id: &ActorId) -> Option<&Actor> {
        self.state.get_actor(id)
    }

    pub fn get_item(&self, id: &ItemId) -> Option<&Item> {
        self.state.get_item(id)
    }

    pub fn get_location(&self, id: &LocationId) -> Option<&Location> {
        self.state.get_location(id)
    }

    pub fn get_lock(&self, id: &LockId) -> Option<&Lock> {
        self.state.get_lock(id)
    }

    pub fn player(&self) -> Option<&Actor> {
        self.state.player()
    }

    /// The location an actor currently occupies.
    pub fn get_current_location(&self, actor_id: &ActorId) -> Option<&Location> {
        let actor = self.get_actor(actor_id)?;
        self.get_location(&actor.location)
    }

    pub fn get_items_in_location(&self, id: &LocationId) -> Vec<&Item> {
        self.state.items_in_location(id)
    }

    pub fn get_items_in_container(&self, id: &ItemId) -> Vec<&Item> {
        self.state.items_in_container(id)
    }

    pub fn current_turn(&self) -> u64 {
        self.state.turn
    }

    /// Declared behavior-module paths for an entity, in order.
    pub fn behaviors_of(&self, entity: &EntityRef) -> Vec<String> {
        match entity {
            EntityRef::Item(id) => self.get_item(id).map(|i| i.behaviors.clone()),
            EntityRef::Actor(id) => self.get_actor(id).map(|a| a.behaviors.clone()),
            EntityRef::Location(id) => self.get_location(id).map(|l| l.behaviors.clone()),
            EntityRef::Lock(_) => None,
        }
        .unwrap_or_default()
    }

    /// Run a behavior chain outside of an update (gift delivery, gossip,
    /// turn phases).
    pub fn invoke_behavior(&mut self, entity: &EntityRef, event: &str, context: &EventContext) -> EventResult {
        let manager = self.manager;
        manager.invoke_behavior(entity, event, self, context)
    }

    // ---- mutation ----

    /// Apply a map of path-addressed changes to one entity.
    ///
    /// Changes apply in map iteration order (sorted, hence deterministic).
    /// When `verb` maps to an event, the entity's behavior chain runs with
    /// the pre-change snapshot in context; a veto rolls this update back
    /// and reports the veto's feedback. Path failures roll back likewise
    /// and return the descriptive error — handlers translate those into
    /// "inconsistent state" narration.
    pub fn update(
        &mut self,
        entity: &EntityRef,
        changes: &BTreeMap<String, Value>,
        verb: Option<&str>,
        actor_id: Option<&ActorId>,
    ) -> UpdateResult {
        let Some(snapshot) = self.snapshot(entity) else {
            return UpdateResult::fail(format!("unknown {} '{}'", entity.kind(), entity.id_str()));
        };

        for (path, value) in changes {
            if let Err(err) = self.apply_one(entity, path, value.clone()) {
                debug!("update of {entity} failed at '{path}': {err}");
                self.restore(snapshot);
                return UpdateResult::fail(err);
            }
        }

        let Some(verb) = verb else {
            return UpdateResult::ok();
        };
        let Some(event) = self.manager.event_for_verb(verb).map(str::to_string) else {
            return UpdateResult::ok();
        };
        let fallback = self.manager.fallback_event_for_verb(verb).map(str::to_string);

        let mut context = EventContext {
            verb: Some(verb.to_string()),
            actor_id: actor_id.cloned(),
            ..EventContext::default()
        };
        context.snapshot = Some(snapshot.clone());

        let manager = self.manager;
        let outcome = manager.invoke_with_fallback(entity, &event, fallback.as_deref(), self, &context);
        if outcome.allow {
            UpdateResult::ok_with(outcome.feedback)
        } else {
            self.restore(snapshot);
            UpdateResult {
                success: false,
                message: outcome.feedback,
            }
        }
    }

    fn apply_one(&mut self, entity: &EntityRef, path: &str, value: Value) -> Result<(), String> {
        match entity {
            EntityRef::Item(id) => {
                if path == "location" {
                    // route through relocation so location lists stay true
                    let Value::Str(dest) = value else {
                        return Err("field 'location' takes a reference string".to_string());
                    };
                    if !self.state.items.contains_key(id) {
                        return Err(format!("unknown item '{id}'"));
                    }
                    self.state.relocate_item(id, &dest);
                    Ok(())
                } else {
                    let item = self
                        .state
                        .get_item_mut(id)
                        .ok_or_else(|| format!("unknown item '{id}'"))?;
                    paths::apply_to_item(item, path, value)
                }
            },
            EntityRef::Actor(id) => {
                if path == "location" {
                    let Value::Str(dest) = value else {
                        return Err("field 'location' takes a location id".to_string());
                    };
                    if !self.state.actors.contains_key(id) {
                        return Err(format!("unknown actor '{id}'"));
                    }
                    self.state.relocate_actor(id, &LocationId::from(dest.as_str()));
                    Ok(())
                } else {
                    let actor = self
                        .state
                        .get_actor_mut(id)
                        .ok_or_else(|| format!("unknown actor '{id}'"))?;
                    paths::apply_to_actor(actor, path, value)
                }
            },
            EntityRef::Location(id) => {
                let location = self
                    .state
                    .get_location_mut(id)
                    .ok_or_else(|| format!("unknown location '{id}'"))?;
                paths::apply_to_location(location, path, value)
            },
            EntityRef::Lock(id) => Err(format!("lock '{id}' is immutable at runtime")),
        }
    }

    fn snapshot(&self, entity: &EntityRef) -> Option<EntitySnapshot> {
        match entity {
            EntityRef::Item(id) => self.get_item(id).cloned().map(Box::new).map(EntitySnapshot::Item),
            EntityRef::Actor(id) => self.get_actor(id).cloned().map(Box::new).map(EntitySnapshot::Actor),
            EntityRef::Location(id) => self
                .get_location(id)
                .cloned()
                .map(Box::new)
                .map(EntitySnapshot::Location),
            EntityRef::Lock(_) => None,
        }
    }

    /// Put an entity back the way the snapshot remembers it, re-syncing
    /// location lists when the entity had moved.
    fn restore(&mut self, snapshot: EntitySnapshot) {
        match snapshot {
            EntitySnapshot::Item(item) => {
                let id = item.id.clone();
                self.state.relocate_item(&id, &item.location);
                if let Some(slot) = self.state.items.get_mut(&id) {
                    *slot = *item;
                }
            },
            EntitySnapshot::Actor(actor) => {
                let id = actor.id.clone();
                self.state.relocate_actor(&id, &actor.location);
                if let Some(slot) = self.state.actors.get_mut(&id) {
                    *slot = *actor;
                }
            },
            EntitySnapshot::Location(location) => {
                let id = location.id.clone();
                if let Some(slot) = self.state.locations.get_mut(&id) {
                    *slot = *location;
                }
            },
        }
    }
}
