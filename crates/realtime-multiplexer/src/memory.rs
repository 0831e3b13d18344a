//! In-process realtime backend.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::tree::{get_at, patch_at, resolve_server_values, set_at, ListenerView};
use crate::{
    EventKind, EventSink, ListenerHandle, RealtimeBackend, RealtimeError, RealtimeEvent,
    RealtimeResult, RealtimeWriter, RemotePath,
};

struct Listener {
    handle: ListenerHandle,
    path: RemotePath,
    sink: EventSink,
    view: ListenerView,
}

#[derive(Default)]
struct MemoryState {
    tree: Value,
    listeners: Vec<Listener>,
    next_handle: u64,
    registrations: usize,
    detaches: usize,
    fail_next: Option<String>,
    last_push_millis: i64,
    push_seq: u32,
}

impl MemoryState {
    fn next_push_key(&mut self, now_millis: i64) -> String {
        if now_millis > self.last_push_millis {
            self.last_push_millis = now_millis;
            self.push_seq = 0;
        } else {
            self.push_seq += 1;
        }
        format!("{:013}{:06}", self.last_push_millis, self.push_seq)
    }
}

type Delivery = (EventSink, RealtimeEvent);

/// A realtime database held in memory.
///
/// Behaves like the hosted database as far as listeners can tell: a value
/// listener receives the current value on registration and again whenever a
/// write at, above or below its path changes it; a child listener receives
/// each direct child once. Also counts registrations and detaches so tests
/// can check how often the remote would have been contacted.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `value` at `path` synchronously, notifying listeners.
    pub fn seed(&self, path: impl Into<RemotePath>, value: Value) {
        let path = path.into();
        self.write(&path, |tree, segments, now| {
            set_at(tree, segments, resolve_server_values(value, now));
        });
    }

    pub fn value_at(&self, path: impl Into<RemotePath>) -> Value {
        let path = path.into();
        let segments: Vec<&str> = path.segments().collect();
        get_at(&self.state.lock().tree, &segments)
    }

    /// Number of successful `on` calls so far.
    pub fn registrations(&self) -> usize {
        self.state.lock().registrations
    }

    /// Number of `off` calls that removed a live listener.
    pub fn detaches(&self) -> usize {
        self.state.lock().detaches
    }

    pub fn active_listeners(&self) -> usize {
        self.state.lock().listeners.len()
    }

    /// Make the next `on` call fail with `message`.
    pub fn fail_next_registration(&self, message: impl Into<String>) {
        self.state.lock().fail_next = Some(message.into());
    }

    /// Cancel every listener at `path` with `message`, as the hosted database
    /// does when security rules start denying a read.
    pub fn cancel_listeners(&self, path: impl Into<RemotePath>, message: &str) {
        let path = path.into();
        let cancelled: Vec<EventSink> = {
            let mut state = self.state.lock();
            let mut cancelled = Vec::new();
            state.listeners.retain(|listener| {
                if listener.path == path {
                    cancelled.push(listener.sink.clone());
                    false
                } else {
                    true
                }
            });
            cancelled
        };
        debug!(path = %path, count = cancelled.len(), "listeners cancelled");
        for sink in cancelled {
            sink(RealtimeEvent::Error(RealtimeError::registration(&path, message)));
        }
    }

    fn write<F>(&self, path: &RemotePath, mutate: F)
    where
        F: FnOnce(&mut Value, &[&str], i64),
    {
        let now = chrono::Utc::now().timestamp_millis();
        let segments: Vec<&str> = path.segments().collect();
        let deliveries: Vec<Delivery> = {
            let mut state = self.state.lock();
            mutate(&mut state.tree, &segments, now);
            let MemoryState {
                tree, listeners, ..
            } = &mut *state;
            let mut deliveries = Vec::new();
            for listener in listeners.iter_mut() {
                if !(listener.path.contains(path) || path.contains(&listener.path)) {
                    continue;
                }
                let listener_segments: Vec<&str> = listener.path.segments().collect();
                let current = get_at(tree, &listener_segments);
                for event in listener.view.refresh(&current) {
                    deliveries.push((listener.sink.clone(), event));
                }
            }
            deliveries
        };
        trace!(path = %path, deliveries = deliveries.len(), "memory write");
        for (sink, event) in deliveries {
            sink(event);
        }
    }
}

#[async_trait]
impl RealtimeBackend for MemoryBackend {
    fn on(
        &self,
        path: &RemotePath,
        kind: EventKind,
        sink: EventSink,
    ) -> RealtimeResult<ListenerHandle> {
        let (handle, initial) = {
            let mut state = self.state.lock();
            if let Some(message) = state.fail_next.take() {
                return Err(RealtimeError::registration(path, message));
            }
            state.next_handle += 1;
            state.registrations += 1;
            let handle = ListenerHandle(state.next_handle);

            let segments: Vec<&str> = path.segments().collect();
            let current = get_at(&state.tree, &segments);
            let mut listener = Listener {
                handle,
                path: path.clone(),
                sink: sink.clone(),
                view: ListenerView::new(kind),
            };
            let initial = listener.view.refresh(&current);
            state.listeners.push(listener);
            (handle, initial)
        };
        debug!(path = %path, kind = %kind, handle = %handle, "memory listener registered");
        for event in initial {
            sink(event);
        }
        Ok(handle)
    }

    fn off(&self, handle: ListenerHandle) {
        let mut state = self.state.lock();
        let before = state.listeners.len();
        state.listeners.retain(|listener| listener.handle != handle);
        if state.listeners.len() < before {
            state.detaches += 1;
            debug!(handle = %handle, "memory listener removed");
        }
    }

    async fn once(&self, path: &RemotePath) -> RealtimeResult<Value> {
        Ok(self.value_at(path.clone()))
    }
}

#[async_trait]
impl RealtimeWriter for MemoryBackend {
    async fn set(&self, path: &RemotePath, value: Value) -> RealtimeResult<()> {
        self.seed(path.clone(), value);
        Ok(())
    }

    async fn update(&self, path: &RemotePath, fields: Map<String, Value>) -> RealtimeResult<()> {
        self.write(path, |tree, segments, now| {
            let fields: Map<String, Value> = fields
                .into_iter()
                .map(|(key, value)| (key, resolve_server_values(value, now)))
                .collect();
            patch_at(tree, segments, &fields);
        });
        Ok(())
    }

    async fn push(&self, path: &RemotePath, value: Value) -> RealtimeResult<String> {
        let now = chrono::Utc::now().timestamp_millis();
        let key = self.state.lock().next_push_key(now);
        self.seed(path.child(&key), value);
        Ok(key)
    }
}
