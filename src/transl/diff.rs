//! Leaf-level diffing between two structured values.
//!
//! Structured values are JSON trees reported by the translation library
//!; a "leaf" is any JSON scalar, empty object, or empty array,
//! addressed by the sequence of object keys / array indices that reach it.

use std::collections::{
    HashMap,
    HashSet,
};

use crate::{
    backends::StructuredValue,
    value::{
        Path,
        PathElem,
        TypedValue,
        Update,
    },
};

type Leaf = (Vec<String>, serde_json::Value);

fn flatten_into(prefix: Vec<String>, value: &serde_json::Value, out: &mut Vec<Leaf>) {
    match value {
        serde_json::Value::Object(map) if !map.is_empty() => {
            for (k, v) in map {
                let mut next = prefix.clone();
                next.push(k.clone());
                flatten_into(next, v, out);
            }
        }
        serde_json::Value::Array(items) if !items.is_empty() => {
            for (i, v) in items.iter().enumerate() {
                let mut next = prefix.clone();
                next.push(i.to_string());
                flatten_into(next, v, out);
            }
        }
        _ => out.push((prefix, value.clone())),
    }
}

fn leaves(value: &serde_json::Value) -> Vec<Leaf> {
    let mut out = Vec::new();
    flatten_into(Vec::new(), value, &mut out);
    out
}

fn leaf_path(elems: &[String]) -> Path {
    Path::new(elems.iter().map(PathElem::simple))
}

fn leaf_update(elems: &[String], value: &serde_json::Value) -> Update {
    Update::new(leaf_path(elems), TypedValue::from_json(value))
}

/// Every leaf of `value`, unconditionally, as updates.
#[must_use]
pub fn record_all(value: &StructuredValue) -> Vec<Update> {
    leaves(value).iter().map(|(p, v)| leaf_update(p, v)).collect()
}

/// Per-leaf update/delete paths between `before` and `after`. A missing
/// `before` is treated as an empty tree, so every leaf of `after` is an
/// update and there are no deletes.
#[must_use]
pub fn diff(before: Option<&StructuredValue>, after: &StructuredValue) -> (Vec<Update>, Vec<Path>) {
    let after_leaves = leaves(after);
    let before_leaves = before.map(leaves).unwrap_or_default();
    let before_map: HashMap<Vec<String>, serde_json::Value> = before_leaves.into_iter().collect();
    let after_keys: HashSet<&Vec<String>> = after_leaves.iter().map(|(p, _)| p).collect();

    let updates = after_leaves
        .iter()
        .filter(|(p, v)| before_map.get(p) != Some(v))
        .map(|(p, v)| leaf_update(p, v))
        .collect();
    let deletes = before_map
        .keys()
        .filter(|p| !after_keys.contains(p))
        .map(|p| leaf_path(p))
        .collect();
    (updates, deletes)
}
