//! Behavior modules and event dispatch.
//!
//! A behavior module is a unit that contributes vocabulary, command
//! handlers (`handle_<verb>`), and per-entity event functions
//! (`on_<event>`). Modules declare themselves in a build-time listing
//! (see [`crate::behaviors_core`] and [`crate::reactions`]) rather than
//! being discovered on disk; the [`BehaviorManager`] merges their
//! vocabularies and builds the verb → handler and verb → event routing
//! tables.
//!
//! When a mutation fires an event for an entity, each module named in the
//! entity's `behaviors` list gets a say, in declared order, followed by the
//! registered global dispatchers. The first veto short-circuits the chain;
//! otherwise feedback accumulates.

use crate::accessor::StateAccessor;
use crate::action::{HandlerResult, ParsedAction};
use crate::vocab::{MergedVocabulary, VocabError, Vocabulary};

use log::warn;
use skein_data::value::Props;
use skein_data::{Actor, ActorId, EntityRef, Item, Location, Value};
use std::collections::BTreeMap;
use variantly::Variantly;

/// A command handler: the whole verb surface has this one signature, and
/// every handler reads its acting actor from the action.
pub type HandlerFn = fn(&mut StateAccessor, &ParsedAction) -> HandlerResult;

/// A per-entity event function (`on_take`, `on_gift_given`, ...).
pub type BehaviorFn = fn(&EntityRef, &mut StateAccessor, &EventContext) -> Verdict;

/// A behavior function's opinion on an event.
#[derive(Debug, Clone, PartialEq, Eq, Variantly)]
pub enum Verdict {
    /// The event concerns this behavior and may proceed.
    Handled { feedback: Option<String> },
    /// The event must not proceed; feedback becomes the failure narration.
    Veto { feedback: Option<String> },
    /// Not this behavior's concern; fall through.
    Pass,
}

impl Verdict {
    pub fn ok() -> Self {
        Verdict::Handled { feedback: None }
    }

    pub fn say(feedback: impl Into<String>) -> Self {
        Verdict::Handled {
            feedback: Some(feedback.into()),
        }
    }

    pub fn veto(feedback: impl Into<String>) -> Self {
        Verdict::Veto {
            feedback: Some(feedback.into()),
        }
    }
}

/// Combined outcome of a behavior chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventResult {
    pub allow: bool,
    pub feedback: Option<String>,
}

impl EventResult {
    pub fn allowed() -> Self {
        Self {
            allow: true,
            feedback: None,
        }
    }
}

/// Clone of an entity taken before a mutation, handed to behaviors so they
/// can compare against the previous state.
#[derive(Debug, Clone)]
pub enum EntitySnapshot {
    Item(Box<Item>),
    Actor(Box<Actor>),
    Location(Box<Location>),
}

/// Context handed to every behavior invocation.
#[derive(Debug, Clone, Default)]
pub struct EventContext {
    pub verb: Option<String>,
    pub actor_id: Option<ActorId>,
    pub snapshot: Option<EntitySnapshot>,
    /// Free-form keys: `keyword` for dialog, `item_id`/`giver_id` for
    /// gifts, `new_state` for leader changes, and so on.
    pub extras: Props,
}

impl EventContext {
    pub fn for_verb(verb: &str, actor_id: &ActorId) -> Self {
        Self {
            verb: Some(verb.to_string()),
            actor_id: Some(actor_id.clone()),
            ..Self::default()
        }
    }

    pub fn with_extra(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extras.insert(key.to_string(), value.into());
        self
    }

    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extras.get(key)
    }

    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra(key).and_then(Value::as_str)
    }
}

/// One self-describing behavior module.
#[derive(Debug, Clone, Default)]
pub struct BehaviorModule {
    /// Stable path entities use in their `behaviors` lists
    /// (e.g. `"core.consumables"`).
    pub path: &'static str,
    pub vocabulary: Vocabulary,
    /// Verb → command handler contributions.
    pub handlers: Vec<(&'static str, HandlerFn)>,
    /// Event → `on_<event>` contributions.
    pub events: Vec<(&'static str, BehaviorFn)>,
    /// Global dispatchers run for every entity, after its declared chain.
    pub global: bool,
}

impl BehaviorModule {
    fn event_fn(&self, event: &str) -> Option<BehaviorFn> {
        self.events
            .iter()
            .find(|(name, _)| *name == event)
            .map(|(_, behavior)| *behavior)
    }
}

/// Owns the module listing, the merged vocabulary, the routing tables, and
/// the named-handler escape hatch registry. Read-only once play begins;
/// tests may clear and re-register named handlers.
#[derive(Debug, Default)]
pub struct BehaviorManager {
    modules: Vec<BehaviorModule>,
    vocabulary: MergedVocabulary,
    verb_handlers: BTreeMap<String, HandlerFn>,
    /// `"module.path:function"` → function, for reaction configs that name
    /// custom logic. Resolution is a map hit, so lookups stay amortized.
    named_handlers: BTreeMap<String, BehaviorFn>,
}

impl BehaviorManager {
    /// Build routing tables from a module listing.
    ///
    /// # Errors
    /// [`VocabError`] when vocabularies conflict, a verb lacks a handler,
    /// or two modules register a handler for the same verb.
    pub fn new(modules: Vec<BehaviorModule>) -> Result<Self, VocabError> {
        let mut manager = Self::default();
        for module in &modules {
            manager.vocabulary.absorb(module.path, &module.vocabulary)?;
            for (verb, handler) in &module.handlers {
                if manager.verb_handlers.insert((*verb).to_string(), *handler).is_some() {
                    return Err(VocabError::DuplicateHandler {
                        word: (*verb).to_string(),
                        module: module.path.to_string(),
                    });
                }
            }
        }
        for verb in manager.vocabulary.verbs() {
            if !manager.verb_handlers.contains_key(&verb.word) {
                return Err(VocabError::MissingHandler {
                    word: verb.word.clone(),
                    module: "<merged>".to_string(),
                });
            }
        }
        manager.modules = modules;
        Ok(manager)
    }

    pub fn vocabulary(&self) -> &MergedVocabulary {
        &self.vocabulary
    }

    /// Resolve a verb (any form) to its command handler.
    pub fn handler_for(&self, verb: &str) -> Option<HandlerFn> {
        let primary = self.vocabulary.resolve_verb(verb)?.word.clone();
        self.verb_handlers.get(&primary).copied()
    }

    /// The event a verb fires, if any.
    pub fn event_for_verb(&self, verb: &str) -> Option<&str> {
        self.vocabulary.event_for_verb(verb)
    }

    /// The fallback event a verb fires, if any.
    pub fn fallback_event_for_verb(&self, verb: &str) -> Option<&str> {
        self.vocabulary.fallback_event_for_verb(verb)
    }

    /// Register a named handler for the reaction escape hatch.
    pub fn register_named_handler(&mut self, path: &str, handler: BehaviorFn) {
        self.named_handlers.insert(path.to_string(), handler);
    }

    /// Resolve a configured handler path. A miss is logged — dispatchers
    /// fall through to their data-driven pass, never silently eat it.
    pub fn resolve_named_handler(&self, path: &str) -> Option<BehaviorFn> {
        let found = self.named_handlers.get(path).copied();
        if found.is_none() {
            warn!("handler path '{path}' failed to resolve; falling through to data-driven reactions");
        }
        found
    }

    /// Drop all named handlers. Supports reloading during testing.
    pub fn clear_named_handlers(&mut self) {
        self.named_handlers.clear();
    }

    /// Run the `on_<event>` chain for an entity: its declared behavior
    /// modules in order, then the global dispatchers.
    pub fn invoke_behavior(
        &self,
        entity: &EntityRef,
        event: &str,
        accessor: &mut StateAccessor,
        context: &EventContext,
    ) -> EventResult {
        self.invoke_chain(entity, event, accessor, context).0
    }

    /// As [`Self::invoke_behavior`], but when no behavior in the chain
    /// responds to `event`, re-run with `fallback` (put → drop).
    pub fn invoke_with_fallback(
        &self,
        entity: &EntityRef,
        event: &str,
        fallback: Option<&str>,
        accessor: &mut StateAccessor,
        context: &EventContext,
    ) -> EventResult {
        let (result, responded) = self.invoke_chain(entity, event, accessor, context);
        if responded {
            return result;
        }
        match fallback {
            Some(fallback_event) => self.invoke_chain(entity, fallback_event, accessor, context).0,
            None => result,
        }
    }

    fn invoke_chain(
        &self,
        entity: &EntityRef,
        event: &str,
        accessor: &mut StateAccessor,
        context: &EventContext,
    ) -> (EventResult, bool) {
        let declared = accessor.behaviors_of(entity);
        let mut feedback: Vec<String> = Vec::new();
        let mut responded = false;

        let mut run = |module: &BehaviorModule,
                       accessor: &mut StateAccessor,
                       feedback: &mut Vec<String>,
                       responded: &mut bool|
         -> Option<EventResult> {
            let behavior = module.event_fn(event)?;
            match behavior(entity, accessor, context) {
                Verdict::Pass => None,
                Verdict::Handled { feedback: msg } => {
                    *responded = true;
                    if let Some(msg) = msg {
                        feedback.push(msg);
                    }
                    None
                },
                Verdict::Veto { feedback: msg } => {
                    *responded = true;
                    Some(EventResult {
                        allow: false,
                        feedback: msg,
                    })
                },
            }
        };

        for path in &declared {
            let Some(module) = self.modules.iter().find(|m| m.path == path) else {
                warn!("entity {entity} names unknown behavior module '{path}'");
                continue;
            };
            if let Some(veto) = run(module, accessor, &mut feedback, &mut responded) {
                return (veto, true);
            }
        }
        for module in self.modules.iter().filter(|m| m.global) {
            if declared.iter().any(|path| path == module.path) {
                continue; // already ran in the declared chain
            }
            if let Some(veto) = run(module, accessor, &mut feedback, &mut responded) {
                return (veto, true);
            }
        }

        let combined = if feedback.is_empty() {
            None
        } else {
            Some(feedback.join(" "))
        };
        (
            EventResult {
                allow: true,
                feedback: combined,
            },
            responded,
        )
    }
}
