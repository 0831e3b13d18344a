//! Helpers over a JSON tree addressed by path segments.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::backend::is_server_timestamp;
use crate::{EventKind, RealtimeEvent};

/// What one listener has already been told about the value at its path.
#[derive(Debug, Clone)]
pub(crate) struct ListenerView {
    kind: EventKind,
    last: Option<Value>,
    seen: BTreeSet<String>,
}

impl ListenerView {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            last: None,
            seen: BTreeSet::new(),
        }
    }

    /// Events needed to bring the listener up to `current`. Value listeners
    /// get the whole value when it changed; child listeners get children they
    /// have not seen (a removed child counts as unseen again).
    pub fn refresh(&mut self, current: &Value) -> Vec<RealtimeEvent> {
        match self.kind {
            EventKind::Value => {
                if self.last.as_ref() == Some(current) {
                    return Vec::new();
                }
                self.last = Some(current.clone());
                vec![RealtimeEvent::Value(current.clone())]
            }
            EventKind::ChildAdded => {
                let children: Vec<(String, Value)> = match current {
                    Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                    _ => Vec::new(),
                };
                self.seen
                    .retain(|key| children.iter().any(|(child, _)| child == key));
                children
                    .into_iter()
                    .filter(|(key, _)| self.seen.insert(key.clone()))
                    .map(|(key, value)| RealtimeEvent::ChildAdded { key, value })
                    .collect()
            }
        }
    }
}

/// Value at `segments`, or `Null` when absent.
pub(crate) fn get_at(root: &Value, segments: &[&str]) -> Value {
    let mut node = root;
    for segment in segments {
        node = match node {
            Value::Object(map) => match map.get(*segment) {
                Some(child) => child,
                None => return Value::Null,
            },
            Value::Array(items) => match segment.parse::<usize>().ok().and_then(|i| items.get(i)) {
                Some(child) => child,
                None => return Value::Null,
            },
            _ => return Value::Null,
        };
    }
    node.clone()
}

/// Replace the value at `segments`. `Null` removes it and prunes parents that
/// become empty.
pub(crate) fn set_at(root: &mut Value, segments: &[&str], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *root = prune(value);
        return;
    };
    if value.is_null() && !root.is_object() {
        return;
    }
    if !root.is_object() {
        *root = Value::Object(Map::new());
    }
    if let Value::Object(map) = root {
        if value.is_null() && rest.is_empty() {
            map.remove(*first);
        } else {
            let child = map.entry(first.to_string()).or_insert(Value::Null);
            set_at(child, rest, value);
            if child.is_null() {
                map.remove(*first);
            }
        }
        if map.is_empty() {
            *root = Value::Null;
        }
    }
}

/// Apply a multi-location update relative to `segments`.
pub(crate) fn patch_at(root: &mut Value, segments: &[&str], fields: &Map<String, Value>) {
    for (key, value) in fields {
        let mut target: Vec<&str> = segments.to_vec();
        target.extend(key.split('/').filter(|segment| !segment.is_empty()));
        set_at(root, &target, value.clone());
    }
}

/// Replace every server-timestamp placeholder with `now_millis`.
pub(crate) fn resolve_server_values(value: Value, now_millis: i64) -> Value {
    if is_server_timestamp(&value) {
        return Value::from(now_millis);
    }
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, child)| (key, resolve_server_values(child, now_millis)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|child| resolve_server_values(child, now_millis))
                .collect(),
        ),
        other => other,
    }
}

/// Drop nulls and empty objects, which the database never stores.
fn prune(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .into_iter()
                .map(|(key, child)| (key, prune(child)))
                .filter(|(_, child)| !child.is_null())
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_creates_intermediate_objects() {
        let mut root = Value::Null;
        set_at(&mut root, &["course", "c1", "title"], json!("Intro"));
        assert_eq!(root, json!({"course": {"c1": {"title": "Intro"}}}));
        assert_eq!(get_at(&root, &["course", "c1"]), json!({"title": "Intro"}));
        assert_eq!(get_at(&root, &["course", "c2"]), Value::Null);
    }

    #[test]
    fn null_removes_and_prunes() {
        let mut root = json!({"course": {"c1": {"title": "Intro"}}, "user": {"u1": 1}});
        set_at(&mut root, &["course", "c1", "title"], Value::Null);
        assert_eq!(root, json!({"user": {"u1": 1}}));
        set_at(&mut root, &["missing", "x"], Value::Null);
        assert_eq!(root, json!({"user": {"u1": 1}}));
    }

    #[test]
    fn patch_writes_nested_keys() {
        let mut root = json!({"course": {"c1": {"title": "Intro", "open": false}}});
        let fields = json!({"open": true, "student/u1": true});
        patch_at(&mut root, &["course", "c1"], fields.as_object().unwrap());
        assert_eq!(
            root,
            json!({"course": {"c1": {"title": "Intro", "open": true, "student": {"u1": true}}}})
        );
    }

    #[test]
    fn child_view_reports_new_children_only() {
        let mut view = ListenerView::new(EventKind::ChildAdded);
        assert_eq!(view.refresh(&json!({"a": 1})).len(), 1);
        assert!(view.refresh(&json!({"a": 2})).is_empty());
        assert_eq!(
            view.refresh(&json!({"a": 2, "b": 3})),
            vec![RealtimeEvent::ChildAdded {
                key: "b".to_string(),
                value: json!(3)
            }]
        );
    }

    #[test]
    fn value_view_skips_unchanged() {
        let mut view = ListenerView::new(EventKind::Value);
        assert_eq!(view.refresh(&Value::Null), vec![RealtimeEvent::Value(Value::Null)]);
        assert!(view.refresh(&Value::Null).is_empty());
    }

    #[test]
    fn resolves_timestamps_recursively() {
        let value = json!({"url": "x", "timestamp": {".sv": "timestamp"}});
        assert_eq!(
            resolve_server_values(value, 42),
            json!({"url": "x", "timestamp": 42})
        );
    }
}
