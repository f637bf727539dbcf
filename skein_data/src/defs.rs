//! World model definitions.
//!
//! [`GameState`] is the complete state of a running game: every location,
//! item, actor and lock, the player (an actor with the reserved id), plus
//! the cross-cutting turn state (turn counter, gossip queue, active
//! commitments) and an `extra` map for global flags and unknown-key
//! carryover from world files.

use crate::ids::{ActorId, ItemId, LocationId, LockId, PLAYER_ID, parse_exit_slot};
use crate::value::{Props, Value};

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use variantly::Variantly;

/// Game-level metadata from the world file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub start_location: LocationId,
}

fn default_version() -> String {
    "1.0".to_string()
}

/// How an exit connects two locations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Variantly)]
#[serde(rename_all = "snake_case")]
pub enum ExitKind {
    #[default]
    Open,
    Door,
    Portal,
    Scripted,
}

/// One exit out of a location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExitDef {
    #[serde(rename = "type", default)]
    pub kind: ExitKind,
    #[serde(default)]
    pub to: Option<LocationId>,
    /// Door item guarding this exit, when `kind` is [`ExitKind::Door`].
    #[serde(default)]
    pub door_id: Option<ItemId>,
    #[serde(default)]
    pub description: Option<String>,
    /// Display name for named exits ("spiral staircase").
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub on_fail: Option<String>,
}

/// A place in the world. Holds denormalized lists of the items and actors
/// present; those lists are kept consistent with each entity's `location`
/// field by the state accessor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub exits: BTreeMap<String, ExitDef>,
    #[serde(default)]
    pub items: Vec<ItemId>,
    #[serde(default)]
    pub actors: Vec<ActorId>,
    #[serde(default, alias = "states")]
    pub properties: Props,
    #[serde(default)]
    pub behaviors: Vec<String>,
}

impl Location {
    pub fn has_exit(&self, direction: &str) -> bool {
        self.exits.contains_key(direction)
    }

    pub fn resolve_exit(&self, direction: &str) -> Option<&ExitDef> {
        self.exits.get(direction)
    }
}

/// Container facet of an item. Presence means the item can hold others.
/// Contents are derived by scanning item `location` fields, never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Surfaces (tables, shelves) expose contents without opening.
    #[serde(default)]
    pub is_surface: bool,
    #[serde(default)]
    pub open: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub lock_id: Option<LockId>,
    /// 0 = unlimited.
    #[serde(default)]
    pub capacity: usize,
}

/// Door facet of an item. A door item's `location` must be an
/// `exit:<loc>:<dir>` slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DoorInfo {
    #[serde(default)]
    pub open: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub lock_id: Option<LockId>,
}

/// Anything inspectable or manipulable that isn't an actor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub portable: bool,
    /// Raw location reference: a location id, a container item id, an actor
    /// id, `"player"`, an `exit:<loc>:<dir>` slot, or `""` once consumed.
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub container: Option<ContainerInfo>,
    #[serde(default)]
    pub door: Option<DoorInfo>,
    #[serde(default, alias = "states")]
    pub properties: Props,
    #[serde(default)]
    pub behaviors: Vec<String>,
}

impl Item {
    pub fn is_door(&self) -> bool {
        self.door.is_some()
    }

    /// The exit slot this door item guards, if its location is one.
    pub fn exit_slot(&self) -> Option<(LocationId, &str)> {
        parse_exit_slot(&self.location)
    }

    /// Consumed items keep their id but live nowhere.
    pub fn is_consumed(&self) -> bool {
        self.location.is_empty()
    }

    pub fn prop(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn prop_bool(&self, key: &str) -> bool {
        self.prop(key).is_some_and(Value::truthy)
    }

    pub fn prop_str(&self, key: &str) -> Option<&str> {
        self.prop(key).and_then(Value::as_str)
    }

    pub fn prop_int(&self, key: &str) -> Option<i64> {
        self.prop(key).and_then(Value::as_int)
    }

    /// Narration trait metadata, if the item carries any.
    pub fn llm_context(&self) -> Option<&Value> {
        self.prop("llm_context")
    }
}

/// A simulable character: the player and every NPC.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: LocationId,
    #[serde(default)]
    pub inventory: Vec<ItemId>,
    #[serde(default, alias = "states")]
    pub properties: Props,
    #[serde(default)]
    pub behaviors: Vec<String>,
}

impl Actor {
    pub fn is_player(&self) -> bool {
        self.id.is_player()
    }

    pub fn prop(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn prop_bool(&self, key: &str) -> bool {
        self.prop(key).is_some_and(Value::truthy)
    }

    pub fn prop_str(&self, key: &str) -> Option<&str> {
        self.prop(key).and_then(Value::as_str)
    }

    pub fn prop_int(&self, key: &str) -> Option<i64> {
        self.prop(key).and_then(Value::as_int)
    }

    /// Coarse affiliation label; `neutral` when unset.
    pub fn disposition(&self) -> &str {
        self.prop_str("disposition").unwrap_or("neutral")
    }

    /// Typed view of the `trust_state` property, if present.
    pub fn trust_state(&self) -> Option<TrustState> {
        self.prop("trust_state").map(TrustState::from_value)
    }

    /// Typed view of the `state_machine` property, if present.
    pub fn state_machine(&self) -> Option<StateMachine> {
        self.prop("state_machine").map(StateMachine::from_value)
    }

    /// Per-player flag map used by dialog topic gating.
    pub fn flag(&self, name: &str) -> Option<&Value> {
        self.prop("flags").and_then(|flags| flags.get(name))
    }

    pub fn set_flag(&mut self, name: &str, value: Value) {
        let flags = self
            .properties
            .entry("flags".to_string())
            .or_insert_with(|| Value::Map(BTreeMap::new()));
        if let Value::Map(map) = flags {
            map.insert(name.to_string(), value);
        }
    }

    pub fn llm_context(&self) -> Option<&Value> {
        self.prop("llm_context")
    }
}

/// Bounded per-NPC trust used to gate dialog and reactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustState {
    pub current: i64,
    pub floor: i64,
    pub ceiling: i64,
}

impl Default for TrustState {
    fn default() -> Self {
        Self {
            current: 0,
            floor: -5,
            ceiling: 5,
        }
    }
}

impl TrustState {
    pub fn from_value(value: &Value) -> Self {
        let fallback = Self::default();
        Self {
            current: value.get("current").and_then(Value::as_int).unwrap_or(fallback.current),
            floor: value.get("floor").and_then(Value::as_int).unwrap_or(fallback.floor),
            ceiling: value
                .get("ceiling")
                .and_then(Value::as_int)
                .unwrap_or(fallback.ceiling),
        }
    }

    pub fn to_value(self) -> Value {
        let mut map = BTreeMap::new();
        map.insert("current".to_string(), Value::Int(self.current));
        map.insert("floor".to_string(), Value::Int(self.floor));
        map.insert("ceiling".to_string(), Value::Int(self.ceiling));
        Value::Map(map)
    }
}

/// Per-actor state machine. `transition` is the only allowed mutation; it
/// adds unknown target states on demand so data-driven configs can
/// introduce new states, and reports whether anything changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateMachine {
    pub states: Vec<String>,
    pub initial: String,
    pub current: String,
}

impl StateMachine {
    pub fn from_value(value: &Value) -> Self {
        let states: Vec<String> = value
            .get("states")
            .map(|s| s.as_str_list().into_iter().map(str::to_string).collect())
            .unwrap_or_default();
        let initial = value
            .get("initial")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let current = value
            .get("current")
            .and_then(Value::as_str)
            .map_or_else(|| initial.clone(), str::to_string);
        Self {
            states,
            initial,
            current,
        }
    }

    pub fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        map.insert(
            "states".to_string(),
            Value::List(self.states.iter().map(|s| Value::Str(s.clone())).collect()),
        );
        map.insert("initial".to_string(), Value::Str(self.initial.clone()));
        map.insert("current".to_string(), Value::Str(self.current.clone()));
        Value::Map(map)
    }

    /// Transition to `new_state`, returning true if the current state changed.
    pub fn transition(&mut self, new_state: &str) -> bool {
        if !self.states.iter().any(|s| s == new_state) {
            self.states.push(new_state.to_string());
        }
        if self.current == new_state {
            return false;
        }
        self.current = new_state.to_string();
        true
    }
}

/// A lock mechanism shared by doors and containers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lock {
    pub id: LockId,
    #[serde(default)]
    pub opens_with: Vec<ItemId>,
    #[serde(default)]
    pub auto_unlock: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub fail_message: String,
}

/// A scripted event carried through load/save untouched; the engine's
/// reaction dispatchers are the active scripting surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Script {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub triggers: Vec<Value>,
    #[serde(default)]
    pub effects: Vec<Value>,
}

/// Lifecycle of a commitment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Variantly)]
#[serde(rename_all = "snake_case")]
pub enum CommitmentState {
    #[default]
    Active,
    Fulfilled,
    Failed,
}

/// A pending promise the world has made, measured in turns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Commitment {
    pub created_turn: u64,
    pub duration: u64,
    /// Global flag name whose truthiness fulfills the commitment.
    #[serde(default)]
    pub success_condition: String,
    /// Declarative effects applied when the commitment fails.
    #[serde(default)]
    pub failure_effects: Props,
    #[serde(default)]
    pub state: CommitmentState,
}

/// A message queued for delayed delivery to specific NPCs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Gossip {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub targets: Vec<ActorId>,
    pub deliver_turn: u64,
}

/// Complete state of a running game.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameState {
    pub metadata: Metadata,
    #[serde(default)]
    pub locations: BTreeMap<LocationId, Location>,
    #[serde(default)]
    pub items: BTreeMap<ItemId, Item>,
    #[serde(default)]
    pub actors: BTreeMap<ActorId, Actor>,
    #[serde(default)]
    pub locks: BTreeMap<LockId, Lock>,
    #[serde(default)]
    pub scripts: Vec<Script>,
    /// Number of turns taken so far.
    #[serde(default)]
    pub turn: u64,
    #[serde(default)]
    pub gossip_queue: Vec<Gossip>,
    /// Active commitments keyed by config id.
    #[serde(default)]
    pub commitments: BTreeMap<String, Commitment>,
    /// Global flags plus unknown top-level keys carried through load/save.
    #[serde(default)]
    pub extra: Props,
}

impl GameState {
    pub fn get_location(&self, id: &LocationId) -> Option<&Location> {
        self.locations.get(id)
    }

    pub fn get_location_mut(&mut self, id: &LocationId) -> Option<&mut Location> {
        self.locations.get_mut(id)
    }

    pub fn get_item(&self, id: &ItemId) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn get_item_mut(&mut self, id: &ItemId) -> Option<&mut Item> {
        self.items.get_mut(id)
    }

    pub fn get_actor(&self, id: &ActorId) -> Option<&Actor> {
        self.actors.get(id)
    }

    pub fn get_actor_mut(&mut self, id: &ActorId) -> Option<&mut Actor> {
        self.actors.get_mut(id)
    }

    pub fn get_lock(&self, id: &LockId) -> Option<&Lock> {
        self.locks.get(id)
    }

    /// The player actor. Every valid world has exactly one.
    pub fn player(&self) -> Option<&Actor> {
        self.actors.get(&ActorId::player())
    }

    pub fn player_mut(&mut self) -> Option<&mut Actor> {
        self.actors.get_mut(&ActorId::player())
    }

    /// Items whose `location` field names this location directly.
    pub fn items_in_location<'a>(&'a self, id: &LocationId) -> Vec<&'a Item> {
        self.items
            .values()
            .filter(|item| item.location == id.as_str())
            .collect()
    }

    /// Items inside a container, derived from item `location` fields.
    pub fn items_in_container<'a>(&'a self, id: &ItemId) -> Vec<&'a Item> {
        self.items
            .values()
            .filter(|item| item.location == id.as_str())
            .collect()
    }

    /// Actors present at a location (the player included).
    pub fn actors_in_location<'a>(&'a self, id: &LocationId) -> Vec<&'a Actor> {
        self.actors.values().filter(|actor| &actor.location == id).collect()
    }

    /// The door item guarding a location's exit, if the exit has one.
    pub fn door_for_exit(&self, location: &LocationId, direction: &str) -> Option<&Item> {
        let exit = self.get_location(location)?.resolve_exit(direction)?;
        exit.door_id.as_ref().and_then(|door_id| self.get_item(door_id))
    }

    /// Global flag lookup against `extra`.
    pub fn flag(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }

    pub fn flag_set(&self, name: &str) -> bool {
        self.flag(name).is_some_and(Value::truthy)
    }

    pub fn set_flag(&mut self, name: &str, value: Value) {
        self.extra.insert(name.to_string(), value);
    }

    /// Relocate an item, keeping the denormalized location lists in sync.
    ///
    /// `new_location` uses the raw reference form described on
    /// [`Item::location`]. Unknown old references are tolerated (the item
    /// may have been consumed or sat in a container slot); unknown *new*
    /// location ids are the caller's bug and are logged.
    pub fn relocate_item(&mut self, item_id: &ItemId, new_location: &str) {
        let Some(old) = self.items.get(item_id).map(|i| i.location.clone()) else {
            warn!("relocate_item: unknown item '{item_id}'");
            return;
        };

        // detach from the old location's denormalized list, if it had one
        let old_loc = LocationId::from(old.as_str());
        if let Some(location) = self.locations.get_mut(&old_loc) {
            location.items.retain(|id| id != item_id);
        }

        // attach to the new location's list when moving into a location
        let new_loc = LocationId::from(new_location);
        if let Some(location) = self.locations.get_mut(&new_loc) {
            if !location.items.contains(item_id) {
                location.items.push(item_id.clone());
            }
        } else if !new_location.is_empty()
            && parse_exit_slot(new_location).is_none()
            && !self.items.contains_key(&ItemId::from(new_location))
            && !self.actors.contains_key(&ActorId::from(new_location))
        {
            warn!("relocate_item: '{item_id}' moved to unknown reference '{new_location}'");
        }

        if let Some(item) = self.items.get_mut(item_id) {
            item.location = new_location.to_string();
        }
    }

    /// Relocate an actor between locations, keeping actor lists in sync.
    pub fn relocate_actor(&mut self, actor_id: &ActorId, destination: &LocationId) {
        let Some(old) = self.actors.get(actor_id).map(|a| a.location.clone()) else {
            warn!("relocate_actor: unknown actor '{actor_id}'");
            return;
        };
        if let Some(location) = self.locations.get_mut(&old) {
            location.actors.retain(|id| id != actor_id);
        }
        if let Some(location) = self.locations.get_mut(destination) {
            if !location.actors.contains(actor_id) {
                location.actors.push(actor_id.clone());
            }
        } else {
            warn!("relocate_actor: '{actor_id}' moved to unknown location '{destination}'");
        }
        if let Some(actor) = self.actors.get_mut(actor_id) {
            actor.location = destination.clone();
        }
    }

    /// Map every id to its entity kind. The reserved player id is always
    /// present.
    pub fn build_id_registry(&self) -> BTreeMap<String, &'static str> {
        let mut registry = BTreeMap::new();
        registry.insert(PLAYER_ID.to_string(), "player");
        for id in self.locations.keys() {
            registry.insert(id.0.clone(), "location");
        }
        for id in self.items.keys() {
            registry.insert(id.0.clone(), "item");
        }
        for id in self.actors.keys() {
            if !id.is_player() {
                registry.insert(id.0.clone(), "actor");
            }
        }
        for id in self.locks.keys() {
            registry.insert(id.0.clone(), "lock");
        }
        for script in &self.scripts {
            registry.insert(script.id.clone(), "script");
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_location(id: &str) -> Location {
        Location {
            id: LocationId::from(id),
            name: format!("Location {id}"),
            description: "A test location".into(),
            ..Location::default()
        }
    }

    fn test_item(id: &str, location: &str) -> Item {
        Item {
            id: ItemId::from(id),
            name: format!("Item {id}"),
            description: "A test item".into(),
            portable: true,
            location: location.to_string(),
            ..Item::default()
        }
    }

    fn test_actor(id: &str, location: &str) -> Actor {
        Actor {
            id: ActorId::from(id),
            name: format!("Actor {id}"),
            description: "A test actor".into(),
            location: LocationId::from(location),
            ..Actor::default()
        }
    }

    fn two_room_state() -> GameState {
        let mut state = GameState::default();
        let mut hall = test_location("loc_hall");
        hall.items.push(ItemId::from("item_coin"));
        state.locations.insert(hall.id.clone(), hall);
        let study = test_location("loc_study");
        state.locations.insert(study.id.clone(), study);
        let coin = test_item("item_coin", "loc_hall");
        state.items.insert(coin.id.clone(), coin);
        let player = test_actor("player", "loc_hall");
        state.actors.insert(player.id.clone(), player);
        state
    }

    #[test]
    fn relocate_item_updates_both_sides() {
        let mut state = two_room_state();
        state.relocate_item(&ItemId::from("item_coin"), "loc_study");

        let coin = state.get_item(&ItemId::from("item_coin")).unwrap();
        assert_eq!(coin.location, "loc_study");
        assert!(
            !state
                .get_location(&LocationId::from("loc_hall"))
                .unwrap()
                .items
                .contains(&coin.id)
        );
        assert!(
            state
                .get_location(&LocationId::from("loc_study"))
                .unwrap()
                .items
                .contains(&coin.id)
        );
    }

    #[test]
    fn relocate_item_to_actor_clears_location_list() {
        let mut state = two_room_state();
        state.relocate_item(&ItemId::from("item_coin"), "player");

        let coin = state.get_item(&ItemId::from("item_coin")).unwrap();
        assert_eq!(coin.location, "player");
        assert!(
            state
                .get_location(&LocationId::from("loc_hall"))
                .unwrap()
                .items
                .is_empty()
        );
    }

    #[test]
    fn relocate_item_to_consumed_leaves_no_listing() {
        let mut state = two_room_state();
        state.relocate_item(&ItemId::from("item_coin"), "");
        let coin = state.get_item(&ItemId::from("item_coin")).unwrap();
        assert!(coin.is_consumed());
    }

    #[test]
    fn relocate_actor_moves_between_location_lists() {
        let mut state = two_room_state();
        state
            .get_location_mut(&LocationId::from("loc_hall"))
            .unwrap()
            .actors
            .push(ActorId::player());

        state.relocate_actor(&ActorId::player(), &LocationId::from("loc_study"));

        assert_eq!(state.player().unwrap().location, LocationId::from("loc_study"));
        assert!(
            state
                .get_location(&LocationId::from("loc_hall"))
                .unwrap()
                .actors
                .is_empty()
        );
        assert!(
            state
                .get_location(&LocationId::from("loc_study"))
                .unwrap()
                .actors
                .contains(&ActorId::player())
        );
    }

    #[test]
    fn state_machine_transition_adds_unknown_states() {
        let mut sm = StateMachine {
            states: vec!["neutral".into(), "friendly".into()],
            initial: "neutral".into(),
            current: "neutral".into(),
        };
        assert!(sm.transition("enraged"));
        assert_eq!(sm.current, "enraged");
        assert!(sm.states.contains(&"enraged".to_string()));
        // current always remains a member of states
        assert!(sm.states.contains(&sm.current));
    }

    #[test]
    fn state_machine_transition_to_same_state_is_noop() {
        let mut sm = StateMachine {
            states: vec!["neutral".into()],
            initial: "neutral".into(),
            current: "neutral".into(),
        };
        assert!(!sm.transition("neutral"));
    }

    #[test]
    fn state_machine_value_round_trip() {
        let sm = StateMachine {
            states: vec!["calm".into(), "alert".into()],
            initial: "calm".into(),
            current: "alert".into(),
        };
        assert_eq!(StateMachine::from_value(&sm.to_value()), sm);
    }

    #[test]
    fn trust_state_defaults_fill_missing_fields() {
        let trust = TrustState::from_value(&crate::value_map! { "current" => 2 });
        assert_eq!(trust.current, 2);
        assert_eq!(trust.floor, -5);
        assert_eq!(trust.ceiling, 5);
    }

    #[test]
    fn actor_flags_live_in_properties() {
        let mut actor = test_actor("player", "loc_hall");
        assert!(actor.flag("met_scholar").is_none());
        actor.set_flag("met_scholar", Value::Bool(true));
        assert!(actor.flag("met_scholar").is_some_and(Value::truthy));
    }

    #[test]
    fn id_registry_reserves_player() {
        let state = two_room_state();
        let registry = state.build_id_registry();
        assert_eq!(registry.get("player"), Some(&"player"));
        assert_eq!(registry.get("loc_hall"), Some(&"location"));
        assert_eq!(registry.get("item_coin"), Some(&"item"));
    }

    #[test]
    fn door_for_exit_resolves_guarding_item() {
        let mut state = two_room_state();
        let mut door = test_item("item_oak_door", "exit:loc_hall:east");
        door.door = Some(DoorInfo::default());
        state
            .get_location_mut(&LocationId::from("loc_hall"))
            .unwrap()
            .exits
            .insert(
                "east".into(),
                ExitDef {
                    kind: ExitKind::Door,
                    to: Some(LocationId::from("loc_study")),
                    door_id: Some(door.id.clone()),
                    ..ExitDef::default()
                },
            );
        state.items.insert(door.id.clone(), door);

        let found = state.door_for_exit(&LocationId::from("loc_hall"), "east").unwrap();
        assert_eq!(found.id, "item_oak_door");
        assert_eq!(found.exit_slot().unwrap().1, "east");
    }
}
