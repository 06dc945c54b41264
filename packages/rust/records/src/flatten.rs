//! Flattening of nested search hits into dotted-key columns.
//!
//! `{"ort": {"plz": "8000"}}` becomes the column `ort.plz` with value `8000`.
//! Arrays are kept whole as compact JSON in a single cell.

use serde_json::{Map, Value};

use crate::record::scalar_text;

/// Flatten `map` into `(dotted_key, cell)` pairs in source order.
pub fn flatten(map: &Map<String, Value>) -> Vec<(String, String)> {
    let mut out = Vec::new();
    flatten_into(map, None, &mut out);
    out
}

fn flatten_into(map: &Map<String, Value>, prefix: Option<&str>, out: &mut Vec<(String, String)>) {
    for (key, value) in map {
        let path = match prefix {
            Some(p) => format!("{p}.{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(nested) if !nested.is_empty() => flatten_into(nested, Some(&path), out),
            Value::Object(_) => out.push((path, String::new())),
            Value::Array(_) => out.push((path, value.to_string())),
            scalar => out.push((path, scalar_text(scalar))),
        }
    }
}

/// Union of the flattened keys of all `maps`, in first-seen order.
///
/// Gives a stable column set even when individual hits omit fields.
pub fn union_columns<'a>(maps: impl IntoIterator<Item = &'a Map<String, Value>>) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for map in maps {
        for (key, _) in flatten(map) {
            if !columns.contains(&key) {
                columns.push(key);
            }
        }
    }
    columns
}

/// Cells of `map` laid out along `columns`; missing keys are empty.
pub fn cells_for(columns: &[String], map: &Map<String, Value>) -> Vec<String> {
    let flat = flatten(map);
    columns
        .iter()
        .map(|col| {
            flat.iter()
                .find(|(key, _)| key == col)
                .map(|(_, cell)| cell.clone())
                .unwrap_or_default()
        })
        .collect()
}
