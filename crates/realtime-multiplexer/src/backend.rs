//! Backend seams: push-callback listener registration and writes.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::{EventKind, RealtimeError, RealtimeResult, RemotePath};

/// Opaque id of one registration with a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerHandle(pub u64);

impl fmt::Display for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// One push from a backend listener.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    /// Full value at the listened path. `Null` when nothing is stored.
    Value(Value),
    /// A direct child appeared.
    ChildAdded { key: String, value: Value },
    /// The listener is dead. No further events follow.
    Error(RealtimeError),
}

/// Callback a backend invokes for every event of a listener. May be called
/// from any thread, including synchronously from inside [`RealtimeBackend::on`].
pub type EventSink = Arc<dyn Fn(RealtimeEvent) + Send + Sync>;

/// Push-style listener registration against a realtime database.
#[async_trait]
pub trait RealtimeBackend: Send + Sync {
    /// Register a listener. Events are delivered to `sink` until [`off`] is
    /// called with the returned handle or an `Error` event is delivered.
    ///
    /// [`off`]: RealtimeBackend::off
    fn on(&self, path: &RemotePath, kind: EventKind, sink: EventSink)
        -> RealtimeResult<ListenerHandle>;

    /// Drop a registration. Unknown handles are ignored.
    fn off(&self, handle: ListenerHandle);

    /// Read the value at `path` once.
    async fn once(&self, path: &RemotePath) -> RealtimeResult<Value>;
}

/// Writes against a realtime database.
#[async_trait]
pub trait RealtimeWriter: Send + Sync {
    /// Replace the value at `path`. Writing `Null` removes it.
    async fn set(&self, path: &RemotePath, value: Value) -> RealtimeResult<()>;

    /// Write several children of `path` at once, leaving the others alone.
    /// Keys may be nested paths (`a/b`).
    async fn update(&self, path: &RemotePath, fields: Map<String, Value>) -> RealtimeResult<()>;

    /// Append `value` under a generated, time-ordered key and return the key.
    async fn push(&self, path: &RemotePath, value: Value) -> RealtimeResult<String>;

    async fn remove(&self, path: &RemotePath) -> RealtimeResult<()> {
        self.set(path, Value::Null).await
    }
}

/// Placeholder the database replaces with its own clock at write time.
pub fn server_timestamp() -> Value {
    json!({ ".sv": "timestamp" })
}

pub fn is_server_timestamp(value: &Value) -> bool {
    value
        .as_object()
        .map(|map| map.len() == 1 && map.get(".sv").and_then(Value::as_str) == Some("timestamp"))
        .unwrap_or(false)
}

/// Tag a child value with its key: objects become `{id: key, ...fields}`,
/// anything else `{id: key, value}`.
pub fn tag_child(key: &str, value: Value) -> Value {
    let mut tagged = Map::new();
    tagged.insert("id".to_string(), Value::String(key.to_string()));
    match value {
        Value::Object(fields) => {
            for (field, value) in fields {
                if field != "id" {
                    tagged.insert(field, value);
                }
            }
        }
        other => {
            tagged.insert("value".to_string(), other);
        }
    }
    Value::Object(tagged)
}

/// Direct children of a value in key order, each tagged with [`tag_child`].
/// Arrays use their indices as keys; scalars and `Null` have no children.
pub fn children_of(value: &Value) -> Vec<Value> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(key, child)| tag_child(key, child.clone()))
            .collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .filter(|(_, child)| !child.is_null())
            .map(|(index, child)| tag_child(&index.to_string(), child.clone()))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_objects_and_scalars() {
        assert_eq!(
            tag_child("a1", json!({"title": "HW1", "open": true})),
            json!({"id": "a1", "title": "HW1", "open": true})
        );
        assert_eq!(tag_child("u1", json!(true)), json!({"id": "u1", "value": true}));
    }

    #[test]
    fn children_follow_key_order() {
        let value = json!({"b": {"n": 2}, "a": {"n": 1}});
        let ids: Vec<_> = children_of(&value)
            .into_iter()
            .map(|child| child["id"].clone())
            .collect();
        assert_eq!(ids, vec![json!("a"), json!("b")]);
        assert!(children_of(&Value::Null).is_empty());
    }

    #[test]
    fn recognizes_server_timestamp() {
        assert!(is_server_timestamp(&server_timestamp()));
        assert!(!is_server_timestamp(&json!({".sv": "other"})));
    }
}
