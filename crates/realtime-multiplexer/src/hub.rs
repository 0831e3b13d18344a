//! Shared subscriptions over a [`RealtimeBackend`].

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures_util::stream::{Map, StreamExt};
use futures_util::Stream;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::backend::{children_of, tag_child};
use crate::{
    DetachPolicy, EventKind, EventSink, ListenerHandle, RealtimeBackend, RealtimeError,
    RealtimeEvent, RealtimeResult, RemotePath,
};

type ListenKey = (RemotePath, EventKind);
type ConsumerTx = mpsc::UnboundedSender<RealtimeResult<Value>>;

/// One backend registration and everyone currently reading from it.
struct Shared {
    /// Distinguishes this registration from a later one on the same key.
    instance: u64,
    handle: Option<ListenerHandle>,
    consumers: HashMap<u64, ConsumerTx>,
    latest: Option<Value>,
    children: Vec<Value>,
    /// Bumped whenever a pending detach is scheduled or superseded.
    generation: u64,
}

impl Shared {
    fn new(instance: u64) -> Self {
        Self {
            instance,
            handle: None,
            consumers: HashMap::new(),
            latest: None,
            children: Vec::new(),
            generation: 0,
        }
    }

    fn replay(&self, kind: EventKind, tx: &ConsumerTx) {
        match kind {
            EventKind::Value => {
                if let Some(latest) = &self.latest {
                    let _ = tx.send(Ok(latest.clone()));
                }
            }
            EventKind::ChildAdded => {
                for child in &self.children {
                    let _ = tx.send(Ok(child.clone()));
                }
            }
        }
    }

    fn broadcast(&self, item: &Value) {
        for tx in self.consumers.values() {
            let _ = tx.send(Ok(item.clone()));
        }
    }
}

#[derive(Default)]
struct HubState {
    entries: HashMap<ListenKey, Shared>,
    next_consumer: u64,
    next_instance: u64,
    closed: bool,
}

struct HubInner {
    backend: Arc<dyn RealtimeBackend>,
    policy: DetachPolicy,
    state: Mutex<HubState>,
}

/// Multiplexes consumer streams onto one backend listener per
/// `(path, kind)`.
///
/// The first `observe` of a key registers with the backend; later ones join
/// the existing registration and are replayed what it has seen so far. When
/// the last consumer goes away the registration is detached according to the
/// [`DetachPolicy`].
#[derive(Clone)]
pub struct SubscriptionHub {
    inner: Arc<HubInner>,
}

impl SubscriptionHub {
    pub fn new(backend: Arc<dyn RealtimeBackend>, policy: DetachPolicy) -> Self {
        Self {
            inner: Arc::new(HubInner {
                backend,
                policy,
                state: Mutex::new(HubState::default()),
            }),
        }
    }

    pub fn backend(&self) -> &Arc<dyn RealtimeBackend> {
        &self.inner.backend
    }

    pub fn policy(&self) -> &DetachPolicy {
        &self.inner.policy
    }

    /// Stream of events for `path`.
    ///
    /// `Value` streams yield the full value on every change, starting with the
    /// latest known one. `ChildAdded` streams yield each child tagged with its
    /// key as `id`. A backend failure arrives as a single `Err` and ends the
    /// stream.
    pub fn observe(&self, path: impl Into<RemotePath>, kind: EventKind) -> Subscription {
        let key: ListenKey = (path.into(), kind);
        let (tx, rx) = mpsc::unbounded_channel();

        let (consumer, register) = {
            let mut state = self.inner.state.lock();
            if state.closed {
                let _ = tx.send(Err(RealtimeError::Closed));
                return Subscription::detached(key, rx);
            }
            state.next_consumer += 1;
            let consumer = state.next_consumer;

            if let Some(shared) = state.entries.get_mut(&key) {
                shared.generation += 1;
                shared.replay(kind, &tx);
                shared.consumers.insert(consumer, tx);
                debug!(
                    path = %key.0,
                    kind = %kind,
                    consumers = shared.consumers.len(),
                    "joined shared listener"
                );
                (consumer, None)
            } else {
                state.next_instance += 1;
                let instance = state.next_instance;
                let mut shared = Shared::new(instance);
                shared.consumers.insert(consumer, tx);
                state.entries.insert(key.clone(), shared);
                (consumer, Some(instance))
            }
        };

        if let Some(instance) = register {
            self.inner.register(&key, instance);
        }

        Subscription {
            key,
            consumer,
            rx,
            hub: Arc::downgrade(&self.inner),
            finished: false,
        }
    }

    /// Read `path` once. Served from a live `Value` listener when one is warm,
    /// otherwise fetched from the backend without registering a listener.
    pub async fn observe_once(&self, path: impl Into<RemotePath>) -> RealtimeResult<Value> {
        let path = path.into();
        let warm = {
            let state = self.inner.state.lock();
            if state.closed {
                return Err(RealtimeError::Closed);
            }
            state
                .entries
                .get(&(path.clone(), EventKind::Value))
                .and_then(|shared| shared.latest.clone())
        };
        if let Some(value) = warm {
            debug!(path = %path, "observe_once served from live listener");
            return Ok(value);
        }
        self.inner.backend.once(&path).await
    }

    /// Children of `path` as an ordered list of `{id, ...fields}` records,
    /// re-emitted whenever the set changes.
    pub fn observe_collection(&self, path: impl Into<RemotePath>) -> CollectionSubscription {
        self.observe(path, EventKind::Value)
            .map(into_collection as fn(RealtimeResult<Value>) -> RealtimeResult<Vec<Value>>)
    }

    /// Backend registrations currently held, idle ones included.
    pub fn listener_count(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn consumer_count(&self, path: impl Into<RemotePath>, kind: EventKind) -> usize {
        self.inner
            .state
            .lock()
            .entries
            .get(&(path.into(), kind))
            .map(|shared| shared.consumers.len())
            .unwrap_or(0)
    }

    pub fn is_attached(&self, path: impl Into<RemotePath>, kind: EventKind) -> bool {
        self.inner
            .state
            .lock()
            .entries
            .contains_key(&(path.into(), kind))
    }

    /// Detach every listener now and refuse new ones. Open streams end.
    pub fn shutdown(&self) {
        let handles: Vec<ListenerHandle> = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            state
                .entries
                .drain()
                .filter_map(|(_, shared)| shared.handle)
                .collect()
        };
        info!(listeners = handles.len(), "subscription hub shut down");
        for handle in handles {
            self.inner.backend.off(handle);
        }
    }
}

impl HubInner {
    fn register(self: &Arc<Self>, key: &ListenKey, instance: u64) {
        let weak = Arc::downgrade(self);
        let sink_key = key.clone();
        let sink: EventSink = Arc::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.dispatch(&sink_key, instance, event);
            }
        });

        match self.backend.on(&key.0, key.1, sink) {
            Ok(handle) => {
                let attached = {
                    let mut state = self.state.lock();
                    match state.entries.get_mut(key) {
                        Some(shared) if shared.instance == instance => {
                            shared.handle = Some(handle);
                            true
                        }
                        _ => false,
                    }
                };
                if attached {
                    debug!(path = %key.0, kind = %key.1, handle = %handle, "listener attached");
                } else {
                    debug!(path = %key.0, handle = %handle, "listener released before attach completed");
                    self.backend.off(handle);
                }
            }
            Err(err) => {
                warn!(path = %key.0, kind = %key.1, error = %err, "listener registration failed");
                self.fail(key, instance, err);
            }
        }
    }

    fn dispatch(&self, key: &ListenKey, instance: u64, event: RealtimeEvent) {
        let failure = {
            let mut state = self.state.lock();
            let Some(shared) = state.entries.get_mut(key) else {
                return;
            };
            if shared.instance != instance {
                return;
            }
            match event {
                RealtimeEvent::Value(value) => {
                    shared.broadcast(&value);
                    shared.latest = Some(value);
                    None
                }
                RealtimeEvent::ChildAdded { key: child, value } => {
                    let tagged = tag_child(&child, value);
                    shared.broadcast(&tagged);
                    shared.children.retain(|seen| {
                        seen.get("id").and_then(Value::as_str) != Some(child.as_str())
                    });
                    shared.children.push(tagged);
                    None
                }
                RealtimeEvent::Error(err) => Some(err),
            }
        };
        if let Some(err) = failure {
            warn!(path = %key.0, kind = %key.1, error = %err, "listener failed");
            self.fail(key, instance, err);
        }
    }

    /// Deliver `err` to every consumer of the registration and forget it.
    fn fail(&self, key: &ListenKey, instance: u64, err: RealtimeError) {
        let handle = {
            let mut state = self.state.lock();
            if state.entries.get(key).map(|shared| shared.instance) != Some(instance) {
                return;
            }
            let Some(shared) = state.entries.remove(key) else {
                return;
            };
            for tx in shared.consumers.values() {
                let _ = tx.send(Err(err.clone()));
            }
            shared.handle
        };
        if let Some(handle) = handle {
            self.backend.off(handle);
        }
    }

    fn release(self: &Arc<Self>, key: &ListenKey, consumer: u64) {
        let mut state = self.state.lock();
        let Some(shared) = state.entries.get_mut(key) else {
            return;
        };
        if shared.consumers.remove(&consumer).is_none() || !shared.consumers.is_empty() {
            return;
        }
        shared.generation += 1;
        let generation = shared.generation;
        let instance = shared.instance;

        match self.policy.timer_runtime() {
            Some(runtime) => {
                drop(state);
                let delay = self.policy.delay();
                debug!(
                    path = %key.0,
                    kind = %key.1,
                    delay_ms = delay.as_millis() as u64,
                    "last consumer left, detach scheduled"
                );
                let deadline = tokio::time::Instant::now() + delay;
                let weak = Arc::downgrade(self);
                let key = key.clone();
                runtime.spawn(async move {
                    tokio::time::sleep_until(deadline).await;
                    if let Some(inner) = weak.upgrade() {
                        inner.expire(&key, instance, generation);
                    }
                });
            }
            None => {
                let handle = state.entries.remove(key).and_then(|shared| shared.handle);
                drop(state);
                debug!(path = %key.0, kind = %key.1, "last consumer left, detached");
                if let Some(handle) = handle {
                    self.backend.off(handle);
                }
            }
        }
    }

    fn expire(&self, key: &ListenKey, instance: u64, generation: u64) {
        let handle = {
            let mut state = self.state.lock();
            let idle = state.entries.get(key).is_some_and(|shared| {
                shared.instance == instance
                    && shared.generation == generation
                    && shared.consumers.is_empty()
            });
            if !idle {
                return;
            }
            state.entries.remove(key).and_then(|shared| shared.handle)
        };
        debug!(path = %key.0, kind = %key.1, "idle listener detached");
        if let Some(handle) = handle {
            self.backend.off(handle);
        }
    }
}

/// One consumer's stream from a [`SubscriptionHub`]. Dropping it releases
/// the consumer's interest.
pub struct Subscription {
    key: ListenKey,
    consumer: u64,
    rx: mpsc::UnboundedReceiver<RealtimeResult<Value>>,
    hub: Weak<HubInner>,
    finished: bool,
}

impl Subscription {
    fn detached(key: ListenKey, rx: mpsc::UnboundedReceiver<RealtimeResult<Value>>) -> Self {
        Self {
            key,
            consumer: 0,
            rx,
            hub: Weak::new(),
            finished: false,
        }
    }

    pub fn path(&self) -> &RemotePath {
        &self.key.0
    }

    pub fn kind(&self) -> EventKind {
        self.key.1
    }

    /// Equivalent to dropping the subscription.
    pub fn cancel(self) {}
}

impl Stream for Subscription {
    type Item = RealtimeResult<Value>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(Err(err))) => {
                self.finished = true;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.hub.upgrade() {
            inner.release(&self.key, self.consumer);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("path", &self.key.0)
            .field("kind", &self.key.1)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

/// Stream returned by [`SubscriptionHub::observe_collection`].
pub type CollectionSubscription =
    Map<Subscription, fn(RealtimeResult<Value>) -> RealtimeResult<Vec<Value>>>;

fn into_collection(item: RealtimeResult<Value>) -> RealtimeResult<Vec<Value>> {
    item.map(|value| children_of(&value))
}
