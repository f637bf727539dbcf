//! The path-addressed mutation DSL.
//!
//! Handlers describe changes declaratively: `"location"` sets a top-level
//! field, `"properties.flags.rescued"` walks into the property bag creating
//! intermediate maps on demand, `"+inventory"` appends to a list and
//! `"-inventory"` removes from one. The interpreter walks the entity's
//! actual field schema, so a path naming a field that doesn't exist fails
//! before anything mutates — misuse is a state bug, reported as a
//! descriptive error string and never a panic.
//!
//! Bare property keys are accepted without the `properties.` prefix
//! (`"states.equipped"` and `"health"` address the bag directly), matching
//! how world authors write reaction configs.

use skein_data::{Actor, Item, ItemId, Location, LocationId, Value};
use skein_data::value::Props;

/// Mutation flavor, from the path's leading sigil.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathOp {
    Set,
    Append,
    Remove,
}

/// A parsed change path: operation plus dot-separated segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangePath {
    pub op: PathOp,
    pub segments: Vec<String>,
}

/// Parse a raw path string.
///
/// # Errors
/// A descriptive message for empty paths or empty segments.
pub fn parse_path(raw: &str) -> Result<ChangePath, String> {
    let (op, rest) = match raw.as_bytes().first() {
        Some(b'+') => (PathOp::Append, &raw[1..]),
        Some(b'-') => (PathOp::Remove, &raw[1..]),
        Some(_) => (PathOp::Set, raw),
        None => return Err("empty change path".to_string()),
    };
    if rest.is_empty() {
        return Err(format!("change path '{raw}' names no field"));
    }
    let segments: Vec<String> = rest.split('.').map(str::to_string).collect();
    if segments.iter().any(String::is_empty) {
        return Err(format!("change path '{raw}' has an empty segment"));
    }
    Ok(ChangePath {
        op,
        segments,
    })
}

/// Apply one change to an item. The caller (the state accessor) is
/// responsible for relocation side effects when `location` changes.
pub fn apply_to_item(item: &mut Item, raw_path: &str, value: Value) -> Result<(), String> {
    let path = parse_path(raw_path)?;
    let field = path.segments[0].as_str();
    match field {
        "name" => set_string(&mut item.name, &path, value, "item"),
        "description" => set_string(&mut item.description, &path, value, "item"),
        "location" => set_raw_location(&mut item.location, &path, value),
        "portable" => set_bool(&mut item.portable, &path, value, "item"),
        "container" => apply_to_container(item, &path, value),
        "door" => apply_to_door(item, &path, value),
        "properties" | "states" => apply_to_props(&mut item.properties, &path, 1, value),
        // bare keys address the property bag directly
        _ => apply_to_props(&mut item.properties, &path, 0, value),
    }
}

/// Apply one change to an actor.
pub fn apply_to_actor(actor: &mut Actor, raw_path: &str, value: Value) -> Result<(), String> {
    let path = parse_path(raw_path)?;
    let field = path.segments[0].as_str();
    match field {
        "name" => set_string(&mut actor.name, &path, value, "actor"),
        "description" => set_string(&mut actor.description, &path, value, "actor"),
        "location" => {
            let loc = require_scalar_string(&path, value)?;
            actor.location = LocationId::from(loc.as_str());
            Ok(())
        },
        "inventory" => apply_to_id_list(&mut actor.inventory, &path, value),
        "properties" | "states" => apply_to_props(&mut actor.properties, &path, 1, value),
        _ => apply_to_props(&mut actor.properties, &path, 0, value),
    }
}

/// Apply one change to a location.
pub fn apply_to_location(location: &mut Location, raw_path: &str, value: Value) -> Result<(), String> {
    let path = parse_path(raw_path)?;
    let field = path.segments[0].as_str();
    match field {
        "name" => set_string(&mut location.name, &path, value, "location"),
        "description" => set_string(&mut location.description, &path, value, "location"),
        "items" => apply_to_id_list(&mut location.items, &path, value),
        "properties" | "states" => apply_to_props(&mut location.properties, &path, 1, value),
        _ => apply_to_props(&mut location.properties, &path, 0, value),
    }
}

fn set_string(slot: &mut String, path: &ChangePath, value: Value, kind: &str) -> Result<(), String> {
    require_set(path, kind)?;
    match value {
        Value::Str(s) => {
            *slot = s;
            Ok(())
        },
        other => Err(format!(
            "field '{}' on {kind} takes a string, got {other:?}",
            path.segments.join(".")
        )),
    }
}

fn set_bool(slot: &mut bool, path: &ChangePath, value: Value, kind: &str) -> Result<(), String> {
    require_set(path, kind)?;
    match value {
        Value::Bool(b) => {
            *slot = b;
            Ok(())
        },
        other => Err(format!(
            "field '{}' on {kind} takes a bool, got {other:?}",
            path.segments.join(".")
        )),
    }
}

fn set_raw_location(slot: &mut String, path: &ChangePath, value: Value) -> Result<(), String> {
    let raw = require_scalar_string(path, value)?;
    *slot = raw;
    Ok(())
}

fn require_set(path: &ChangePath, kind: &str) -> Result<(), String> {
    if path.op == PathOp::Set && path.segments.len() == 1 {
        Ok(())
    } else {
        Err(format!(
            "field '{}' on {kind} is a scalar; append/remove and nesting do not apply",
            path.segments[0]
        ))
    }
}

fn require_scalar_string(path: &ChangePath, value: Value) -> Result<String, String> {
    if path.op != PathOp::Set || path.segments.len() != 1 {
        return Err(format!(
            "field '{}' is a scalar; append/remove and nesting do not apply",
            path.segments[0]
        ));
    }
    match value {
        Value::Str(s) => Ok(s),
        other => Err(format!("field '{}' takes a string, got {other:?}", path.segments[0])),
    }
}

/// `container.open`, `container.locked`, `container.lock_id`,
/// `container.capacity`, `container.is_surface`.
fn apply_to_container(item: &mut Item, path: &ChangePath, value: Value) -> Result<(), String> {
    let Some(container) = item.container.as_mut() else {
        return Err(format!("item '{}' is not a container", item.id));
    };
    if path.op != PathOp::Set || path.segments.len() != 2 {
        return Err("container fields are scalars addressed as 'container.<field>'".to_string());
    }
    match (path.segments[1].as_str(), value) {
        ("open", Value::Bool(b)) => container.open = b,
        ("locked", Value::Bool(b)) => container.locked = b,
        ("is_surface", Value::Bool(b)) => container.is_surface = b,
        ("lock_id", Value::Str(s)) => container.lock_id = Some(s.as_str().into()),
        ("lock_id", Value::Null) => container.lock_id = None,
        ("capacity", Value::Int(n)) if n >= 0 => {
            container.capacity = usize::try_from(n).unwrap_or_default();
        },
        (field @ ("open" | "locked" | "is_surface" | "lock_id" | "capacity"), other) => {
            return Err(format!("container.{field} rejects value {other:?}"));
        },
        (field, _) => return Err(format!("unknown container field '{field}'")),
    }
    Ok(())
}

/// `door.open`, `door.locked`, `door.lock_id`.
fn apply_to_door(item: &mut Item, path: &ChangePath, value: Value) -> Result<(), String> {
    let Some(door) = item.door.as_mut() else {
        return Err(format!("item '{}' is not a door", item.id));
    };
    if path.op != PathOp::Set || path.segments.len() != 2 {
        return Err("door fields are scalars addressed as 'door.<field>'".to_string());
    }
    match (path.segments[1].as_str(), value) {
        ("open", Value::Bool(b)) => door.open = b,
        ("locked", Value::Bool(b)) => door.locked = b,
        ("lock_id", Value::Str(s)) => door.lock_id = Some(s.as_str().into()),
        ("lock_id", Value::Null) => door.lock_id = None,
        (field @ ("open" | "locked" | "lock_id"), other) => {
            return Err(format!("door.{field} rejects value {other:?}"));
        },
        (field, _) => return Err(format!("unknown door field '{field}'")),
    }
    Ok(())
}

/// Append/remove/set against a typed id list (inventories, location item
/// lists). Values must be id strings.
fn apply_to_id_list(list: &mut Vec<ItemId>, path: &ChangePath, value: Value) -> Result<(), String> {
    let field = &path.segments[0];
    if path.segments.len() != 1 {
        return Err(format!("field '{field}' is a flat list; nested paths do not apply"));
    }
    match path.op {
        PathOp::Set => Err(format!("field '{field}' is a list; use '+{field}' or '-{field}'")),
        PathOp::Append => {
            let Value::Str(id) = value else {
                return Err(format!("'+{field}' takes an id string"));
            };
            let id = ItemId::from(id.as_str());
            if !list.contains(&id) {
                list.push(id);
            }
            Ok(())
        },
        PathOp::Remove => {
            let Value::Str(id) = value else {
                return Err(format!("'-{field}' takes an id string"));
            };
            let id = ItemId::from(id.as_str());
            let before = list.len();
            list.retain(|entry| entry != &id);
            if list.len() == before {
                // removing something absent signals a state bug upstream
                return Err(format!("'-{field}': '{id}' was not present"));
            }
            Ok(())
        },
    }
}

/// Walk (and create) nested maps inside a property bag, then apply the
/// operation at the final key.
fn apply_to_props(props: &mut Props, path: &ChangePath, skip: usize, value: Value) -> Result<(), String> {
    let segments = &path.segments[skip..];
    if segments.is_empty() {
        return Err("property path names no key".to_string());
    }
    let (last, walk) = segments.split_last().expect("segments checked non-empty");

    let mut current = props;
    for segment in walk {
        let entry = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Map(std::collections::BTreeMap::new()));
        match entry {
            Value::Map(map) => current = map,
            other => {
                return Err(format!(
                    "property '{segment}' holds {other:?}, not a map; cannot descend"
                ));
            },
        }
    }

    match path.op {
        PathOp::Set => {
            current.insert(last.clone(), value);
            Ok(())
        },
        PathOp::Append => {
            let entry = current.entry(last.clone()).or_insert_with(|| Value::List(Vec::new()));
            match entry {
                Value::List(list) => {
                    list.push(value);
                    Ok(())
                },
                other => Err(format!("property '{last}' holds {other:?}; '+' needs a list")),
            }
        },
        PathOp::Remove => {
            let Some(entry) = current.get_mut(last) else {
                return Err(format!("property '{last}' does not exist; cannot remove from it"));
            };
            match entry {
                Value::List(list) => {
                    let before = list.len();
                    list.retain(|v| v != &value);
                    if list.len() == before {
                        return Err(format!("'-{last}': value {value:?} was not present"));
                    }
                    Ok(())
                },
                other => Err(format!("property '{last}' holds {other:?}; '-' needs a list")),
            }
        },
    }
}
