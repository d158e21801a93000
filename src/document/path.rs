//! Dotted-path access over JSON records

use serde_json::{Map, Value};

/// Identifier field carried by every record
pub const ID_FIELD: &str = "_id";

fn parts(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|p| !p.is_empty())
}

/// Reads the value at `path`, fanning out through arrays.
///
/// An array met on the way yields an array of the per-element results,
/// with elements that lack the field left out. A missing field yields
/// `null`. An empty path yields the value itself.
pub fn project(value: &Value, path: &str) -> Value {
    let parts: Vec<&str> = parts(path).collect();
    project_parts(value, &parts).unwrap_or(Value::Null)
}

fn project_parts(value: &Value, parts: &[&str]) -> Option<Value> {
    let Some((head, rest)) = parts.split_first() else {
        return Some(value.clone());
    };

    match value {
        Value::Object(map) => map.get(*head).and_then(|v| project_parts(v, rest)),
        Value::Array(items) => Some(Value::Array(
            items
                .iter()
                .filter_map(|item| project_parts(item, parts))
                .collect(),
        )),
        _ => None,
    }
}

/// Flattens a projected value into the candidates a test is applied to:
/// the value itself, then every nested array element.
pub fn candidates(value: &Value) -> Vec<&Value> {
    let mut out = vec![value];
    if let Value::Array(items) = value {
        for item in items {
            out.extend(candidates(item));
        }
    }
    out
}

/// Writes `new_value` at `path`, creating intermediate objects.
pub fn set_path(target: &mut Value, path: &str, new_value: Value) {
    let parts: Vec<&str> = parts(path).collect();
    let Some((last, prefix)) = parts.split_last() else {
        *target = new_value;
        return;
    };

    let mut current = target;
    for part in prefix {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        current = map
            .entry((*part).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Value::Object(map) = current {
        map.insert((*last).to_string(), new_value);
    }
}

/// Removes the field at `path` if present.
pub fn remove_path(target: &mut Value, path: &str) {
    let parts: Vec<&str> = parts(path).collect();
    let Some((last, prefix)) = parts.split_last() else {
        return;
    };

    let mut current = target;
    for part in prefix {
        match current.get_mut(*part) {
            Some(next) => current = next,
            None => return,
        }
    }
    if let Value::Object(map) = current {
        map.remove(*last);
    }
}

/// Returns the record identifier, if present and not null
pub fn id_of(record: &Value) -> Option<&Value> {
    record.get(ID_FIELD).filter(|id| !id.is_null())
}

/// Canonical string key for an identifier.
///
/// Uses the JSON text so that `"5"` and `5` stay distinct.
pub fn id_key(id: &Value) -> String {
    id.to_string()
}

/// Overlays the fields of a partial update onto `base`.
///
/// Dotted keys in the partial address nested fields. The identifier is
/// never overwritten.
pub fn apply_partial(base: &Value, partial: &Value) -> Value {
    let mut merged = base.clone();
    if let Value::Object(changes) = partial {
        for (key, value) in changes {
            if key == ID_FIELD {
                continue;
            }
            set_path(&mut merged, key, value.clone());
        }
    }
    merged
}
