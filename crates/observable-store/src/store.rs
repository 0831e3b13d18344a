//! The keyed cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::watched::{CollectionStream, RecordStream, Watched};
use crate::{CacheKey, HydrationState, Record};

type Slot<T> = Arc<watch::Sender<Option<T>>>;

#[derive(Default)]
struct Entries {
    records: HashMap<CacheKey, Slot<Record>>,
    collections: HashMap<String, Slot<Vec<Record>>>,
}

/// Shared handle to the cache. Clones share state.
///
/// Writers to the same key are serialized by the key's slot; each write is
/// applied to whatever snapshot the previous write left behind, so the last
/// write wins per field in arrival order.
#[derive(Clone, Default)]
pub struct Store {
    entries: Arc<Mutex<Entries>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record_slot(&self, key: &CacheKey) -> Slot<Record> {
        self.entries()
            .records
            .entry(key.clone())
            .or_insert_with(|| Arc::new(watch::channel(None).0))
            .clone()
    }

    fn collection_slot(&self, name: &str) -> Slot<Vec<Record>> {
        self.entries()
            .collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(watch::channel(None).0))
            .clone()
    }

    /// Subscribe to `key`. The reader yields the current snapshot (possibly
    /// `None`) first.
    pub fn get(&self, key: &CacheKey) -> RecordStream {
        Watched::new(self.record_slot(key).subscribe())
    }

    /// Current snapshot of `key`.
    pub fn snapshot(&self, key: &CacheKey) -> Option<Record> {
        let slot = self.entries().records.get(key).cloned();
        slot.and_then(|slot| slot.borrow().clone())
    }

    /// Overlay `partial` onto the snapshot at `key` and return the result.
    /// Readers are only notified when a field actually changed.
    pub fn merge(&self, key: &CacheKey, partial: Record) -> Record {
        let slot = self.record_slot(key);
        let mut merged = None;
        let changed = slot.send_if_modified(|current| {
            let changed = match current {
                Some(existing) => existing.merge(&partial),
                None => {
                    *current = Some(Record::new().overlay(&partial));
                    true
                }
            };
            merged = current.clone();
            changed
        });
        trace!(key = %key, changed, fields = partial.len(), "store merge");
        merged.unwrap_or_default()
    }

    /// Replace the snapshot at `key` wholesale. Only for producers known to
    /// emit complete snapshots; `None` clears the entry.
    pub fn replace(&self, key: &CacheKey, record: Option<Record>) {
        let slot = self.record_slot(key);
        slot.send_if_modified(|current| {
            if *current == record {
                false
            } else {
                *current = record;
                true
            }
        });
        trace!(key = %key, "store replace");
    }

    /// Subscribe to the list view `name`.
    pub fn collection(&self, name: &str) -> CollectionStream {
        Watched::new(self.collection_slot(name).subscribe())
    }

    pub fn collection_snapshot(&self, name: &str) -> Option<Vec<Record>> {
        let slot = self.entries().collections.get(name).cloned();
        slot.and_then(|slot| slot.borrow().clone())
    }

    /// Replace the list view `name` and merge every member that carries an
    /// `id` into its entity entry `{name}/{id}`.
    pub fn replace_all(&self, name: &str, records: Vec<Record>) {
        for record in &records {
            match record.id() {
                Some(id) => {
                    self.merge(&CacheKey::entity(name, id), record.clone());
                }
                None => trace!(collection = name, "collection member without id"),
            }
        }
        debug!(collection = name, count = records.len(), "store replace_all");
        self.collection_slot(name).send_replace(Some(records));
    }

    /// Pre-seed from a server-rendered initial state. Goes through the same
    /// merge path as live updates, so later merges never lose hydrated
    /// fields.
    pub fn hydrate(&self, state: HydrationState) {
        if let Some(courses) = state.courses {
            self.replace_all(HydrationState::COURSE_KIND, courses);
        }
        if let Some(course) = state.course {
            match course.id().map(str::to_string) {
                Some(id) => {
                    self.merge(&CacheKey::entity(HydrationState::COURSE_KIND, &id), course);
                }
                None => warn!("hydration course without id skipped"),
            }
        }
        if let Some(me) = state.me {
            self.merge(&CacheKey::new(HydrationState::ME_KEY), me);
        }
        debug!("store hydrated");
    }

    /// Number of entity entries ever touched.
    pub fn len(&self) -> usize {
        self.entries().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn record(value: Value) -> Record {
        Record::try_from(value).unwrap()
    }

    #[tokio::test]
    async fn unknown_key_yields_none_first() {
        let store = Store::new();
        let mut reader = store.get(&CacheKey::new("course/missing"));
        assert_eq!(reader.next().await, Some(None));
    }

    #[tokio::test]
    async fn late_subscriber_gets_latest_immediately() {
        let store = Store::new();
        let key = CacheKey::entity("course", "c1");
        store.merge(&key, record(json!({"id": "c1", "title": "Intro"})));

        let mut reader = store.get(&key);
        let first = reader.next().await.flatten().unwrap();
        assert_eq!(first.get("title"), Some(&json!("Intro")));
    }

    #[tokio::test]
    async fn early_subscriber_sees_updates_in_order() {
        let store = Store::new();
        let key = CacheKey::entity("course", "c1");
        let mut reader = store.get(&key);
        assert_eq!(reader.next().await, Some(None));

        store.merge(&key, record(json!({"id": "c1"})));
        assert_eq!(
            reader.next().await.flatten(),
            Some(record(json!({"id": "c1"})))
        );

        store.merge(&key, record(json!({"title": "Intro"})));
        assert_eq!(
            reader.next().await.flatten(),
            Some(record(json!({"id": "c1", "title": "Intro"})))
        );
    }

    #[tokio::test]
    async fn noop_merge_does_not_notify() {
        let store = Store::new();
        let key = CacheKey::new("me");
        store.merge(&key, record(json!({"name": "a"})));
        let mut reader = store.get(&key);
        reader.next().await;

        store.merge(&key, record(json!({"name": "a"})));
        let pending = tokio::time::timeout(std::time::Duration::from_millis(20), reader.next()).await;
        assert!(pending.is_err());
    }

    #[test]
    fn merge_returns_merged_snapshot() {
        let store = Store::new();
        let key = CacheKey::new("me");
        store.merge(&key, record(json!({"a": 1})));
        let merged = store.merge(&key, record(json!({"b": 2})));
        assert_eq!(merged, record(json!({"a": 1, "b": 2})));
        assert_eq!(store.snapshot(&key), Some(merged));
    }

    #[test]
    fn replace_drops_old_fields() {
        let store = Store::new();
        let key = CacheKey::new("list:ids");
        store.merge(&key, record(json!({"a": 1, "b": 2})));
        store.replace(&key, Some(record(json!({"b": 3}))));
        assert_eq!(store.snapshot(&key), Some(record(json!({"b": 3}))));
        store.replace(&key, None);
        assert_eq!(store.snapshot(&key), None);
    }

    #[tokio::test]
    async fn replace_all_fills_entities_and_list() {
        let store = Store::new();
        store.merge(
            &CacheKey::entity("course", "c1"),
            record(json!({"id": "c1", "attend": "A12"})),
        );

        store.replace_all(
            "course",
            vec![
                record(json!({"id": "c1", "title": "Intro"})),
                record(json!({"id": "c2", "title": "Advanced"})),
            ],
        );

        let mut list = store.collection("course");
        let courses = list.next_defined().await.unwrap();
        assert_eq!(courses.len(), 2);
        assert_eq!(
            store.snapshot(&CacheKey::entity("course", "c1")),
            Some(record(json!({"id": "c1", "title": "Intro", "attend": "A12"})))
        );
        assert!(store.snapshot(&CacheKey::entity("course", "c2")).is_some());
    }

    #[tokio::test]
    async fn concurrent_writers_keep_every_field() {
        let store = Store::new();
        let key = CacheKey::entity("course", "c1");
        let mut tasks = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            let key = key.clone();
            tasks.push(tokio::spawn(async move {
                store.merge(&key, record(json!({ format!("f{}", i): i })));
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(store.snapshot(&key).unwrap().len(), 16);
    }
}
