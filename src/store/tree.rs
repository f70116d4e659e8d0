//! Operations on JSON trees with the store's storage rules: `null` means
//! absent and empty objects aren't kept.

use serde_json::{Map, Value};

use crate::keys::Key;

pub fn lookup<'a>(node: &'a Value, segments: &[Key]) -> Option<&'a Value> {
    let mut current = node;
    for segment in segments {
        current = current.as_object()?.get(segment.as_str())?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Strips `null` members and empty objects. An object left without members
/// collapses into `null`.
pub fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, normalize(v)))
                .filter(|(_, v)| !v.is_null())
                .collect();
            if map.is_empty() {
                Value::Null
            } else {
                Value::Object(map)
            }
        }
        other => other,
    }
}

/// Replaces the node at `segments` with `value`. Writing `null` removes the
/// node and prunes ancestors left empty.
pub fn write(node: &mut Value, segments: &[Key], value: Value) {
    write_normalized(node, segments, normalize(value))
}

fn write_normalized(node: &mut Value, segments: &[Key], value: Value) {
    let (head, rest) = match segments.split_first() {
        Some(it) => it,
        None => {
            *node = value;
            return;
        }
    };

    if value.is_null() {
        if let Value::Object(map) = node {
            if let Some(child) = map.get_mut(head.as_str()) {
                write_normalized(child, rest, Value::Null);
                if child.is_null() {
                    map.remove(head.as_str());
                }
            }
            if map.is_empty() {
                *node = Value::Null;
            }
        }
        return;
    }

    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map
            .entry(head.as_str().to_string())
            .or_insert(Value::Null);
        write_normalized(child, rest, value);
    }
}

/// Children of an object node as `(key, value)` pairs in key order.
pub fn children(node: Option<Value>) -> Vec<(String, Value)> {
    let mut children: Vec<(String, Value)> = match node {
        Some(Value::Object(map)) => map.into_iter().filter(|(_, v)| !v.is_null()).collect(),
        _ => vec![],
    };
    children.sort_by(|a, b| a.0.cmp(&b.0));
    children
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Path;
    use serde_json::json;

    fn seg(s: &str) -> Vec<Key> {
        Path::parse(s).unwrap().segments().to_vec()
    }

    #[test]
    fn write_creates_intermediate_nodes() {
        let mut root = Value::Null;
        write(&mut root, &seg("a/b/c"), json!(1));
        assert_eq!(root, json!({"a": {"b": {"c": 1}}}));
        assert_eq!(lookup(&root, &seg("a/b")), Some(&json!({"c": 1})));
    }

    #[test]
    fn removing_last_child_prunes_ancestors() {
        let mut root = json!({"a": {"b": {"c": 1}}, "x": true});
        write(&mut root, &seg("a/b/c"), Value::Null);
        assert_eq!(root, json!({"x": true}));

        write(&mut root, &seg("x"), Value::Null);
        assert_eq!(root, Value::Null);
    }

    #[test]
    fn removing_missing_node_is_noop() {
        let mut root = json!({"a": 1});
        write(&mut root, &seg("b/c"), Value::Null);
        assert_eq!(root, json!({"a": 1}));
    }

    #[test]
    fn empty_objects_are_not_stored() {
        let mut root = Value::Null;
        write(&mut root, &seg("class"), json!({"name": "A", "students": {}}));
        assert_eq!(root, json!({"class": {"name": "A"}}));
        assert!(lookup(&root, &seg("class/students")).is_none());
    }

    #[test]
    fn children_are_key_ordered() {
        let node = json!({"b": 2, "a": 1});
        let keys: Vec<String> = children(Some(node)).into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
