//! Realtime database over its REST and event-stream protocol.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};
use url::Url;

use crate::sse::{SseDecoder, SseFrame};
use crate::tree::{patch_at, set_at, ListenerView};
use crate::{
    EventKind, EventSink, ListenerHandle, RealtimeBackend, RealtimeError, RealtimeEvent,
    RealtimeResult, RealtimeWriter, RemotePath,
};

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Client for a hosted realtime database.
///
/// Reads and writes go to `{database_url}/{path}.json`; listeners hold one
/// `text/event-stream` request each. The current auth token, if any, is sent
/// as the `auth` query parameter. A token change reopens every open event
/// stream with the new token; listeners keep what they have already seen, so
/// consumers only hear about values that actually differ.
pub struct FirebaseRestBackend {
    http_client: reqwest::Client,
    database_url: Url,
    request_timeout: Duration,
    auth_token: RwLock<Option<String>>,
    listeners: Mutex<HashMap<ListenerHandle, Listener>>,
    next_handle: AtomicU64,
}

/// One open event stream and what is needed to reopen it.
struct Listener {
    path: RemotePath,
    kind: EventKind,
    sink: EventSink,
    mirror: Arc<Mutex<StreamMirror>>,
    runtime: Handle,
    task: JoinHandle<()>,
}

impl FirebaseRestBackend {
    pub fn new(database_url: Url, request_timeout: Duration) -> RealtimeResult<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .build()?;
        Ok(Self::with_http_client(database_url, http_client, request_timeout))
    }

    /// Use a preconfigured client (proxy, TLS roots).
    pub fn with_http_client(
        database_url: Url,
        http_client: reqwest::Client,
        request_timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            database_url,
            request_timeout,
            auth_token: RwLock::new(None),
            listeners: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(0),
        }
    }

    /// Replace the auth token. Open event streams are reopened when it
    /// actually changes.
    pub fn set_auth_token(&self, token: Option<String>) {
        let token = token.filter(|token| !token.is_empty());
        {
            let mut current = self.auth_token.write();
            if *current == token {
                return;
            }
            *current = token;
        }

        let mut listeners = self.listeners.lock();
        debug!(
            authenticated = self.auth_token.read().is_some(),
            listeners = listeners.len(),
            "realtime auth token changed, reopening event streams"
        );
        for (handle, listener) in listeners.iter_mut() {
            let url = match self.endpoint(&listener.path) {
                Ok(url) => url,
                Err(err) => {
                    warn!(handle = %handle, error = %err, "event stream not reopened");
                    continue;
                }
            };
            listener.task.abort();
            listener.task = listener.runtime.spawn(run_listener(
                self.http_client.clone(),
                url,
                listener.path.clone(),
                listener.kind,
                listener.sink.clone(),
                listener.mirror.clone(),
            ));
        }
    }

    /// Number of open event streams.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn database_url(&self) -> &Url {
        &self.database_url
    }

    fn endpoint(&self, path: &RemotePath) -> RealtimeResult<Url> {
        let relative = if path.is_root() {
            ".json".to_string()
        } else {
            format!("{}.json", path.as_str())
        };
        let mut url = self.database_url.join(&relative)?;
        if let Some(token) = self.auth_token.read().as_deref() {
            url.query_pairs_mut().append_pair("auth", token);
        }
        Ok(url)
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> RealtimeResult<Value> {
        let response = request.timeout(self.request_timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body_summary = summarize_response_body(&body);
            error!(status = %status, body_summary = %body_summary, "realtime request failed");
            return Err(RealtimeError::Status {
                status: status.as_u16(),
                body_summary,
            });
        }
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

impl Drop for FirebaseRestBackend {
    fn drop(&mut self) {
        for (_, listener) in self.listeners.lock().drain() {
            listener.task.abort();
        }
    }
}

#[async_trait]
impl RealtimeBackend for FirebaseRestBackend {
    fn on(
        &self,
        path: &RemotePath,
        kind: EventKind,
        sink: EventSink,
    ) -> RealtimeResult<ListenerHandle> {
        let runtime = Handle::try_current()
            .map_err(|_| RealtimeError::registration(path, "no async runtime to stream on"))?;
        let url = self.endpoint(path)?;
        let handle = ListenerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);

        let mirror = Arc::new(Mutex::new(StreamMirror::new(kind)));
        let task = runtime.spawn(run_listener(
            self.http_client.clone(),
            url,
            path.clone(),
            kind,
            sink.clone(),
            mirror.clone(),
        ));
        self.listeners.lock().insert(
            handle,
            Listener {
                path: path.clone(),
                kind,
                sink,
                mirror,
                runtime,
                task,
            },
        );
        debug!(path = %path, kind = %kind, handle = %handle, "event stream opened");
        Ok(handle)
    }

    fn off(&self, handle: ListenerHandle) {
        if let Some(listener) = self.listeners.lock().remove(&handle) {
            listener.task.abort();
            debug!(handle = %handle, "event stream closed");
        }
    }

    async fn once(&self, path: &RemotePath) -> RealtimeResult<Value> {
        let url = self.endpoint(path)?;
        self.execute(self.http_client.get(url)).await
    }
}

#[async_trait]
impl RealtimeWriter for FirebaseRestBackend {
    async fn set(&self, path: &RemotePath, value: Value) -> RealtimeResult<()> {
        let url = self.endpoint(path)?;
        self.execute(self.http_client.put(url).json(&value)).await?;
        Ok(())
    }

    async fn update(&self, path: &RemotePath, fields: Map<String, Value>) -> RealtimeResult<()> {
        let url = self.endpoint(path)?;
        self.execute(self.http_client.patch(url).json(&fields)).await?;
        Ok(())
    }

    async fn push(&self, path: &RemotePath, value: Value) -> RealtimeResult<String> {
        let url = self.endpoint(path)?;
        let reply = self.execute(self.http_client.post(url).json(&value)).await?;
        reply
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| RealtimeError::Decode("push reply without name".to_string()))
    }

    async fn remove(&self, path: &RemotePath) -> RealtimeResult<()> {
        let url = self.endpoint(path)?;
        self.execute(self.http_client.delete(url)).await?;
        Ok(())
    }
}

async fn run_listener(
    http_client: reqwest::Client,
    url: Url,
    path: RemotePath,
    kind: EventKind,
    sink: EventSink,
    mirror: Arc<Mutex<StreamMirror>>,
) {
    let outcome = stream_events(&http_client, url, &path, &sink, &mirror).await;
    let err = match outcome {
        Ok(()) => RealtimeError::Transport("event stream ended".to_string()),
        Err(err) => err,
    };
    warn!(path = %path, kind = %kind, error = %err, "event stream failed");
    sink(RealtimeEvent::Error(err));
}

async fn stream_events(
    http_client: &reqwest::Client,
    url: Url,
    path: &RemotePath,
    sink: &EventSink,
    mirror: &Mutex<StreamMirror>,
) -> RealtimeResult<()> {
    let response = http_client
        .get(url)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RealtimeError::registration(
            path,
            format!("status {} ({})", status.as_u16(), summarize_response_body(&body)),
        ));
    }

    let mut decoder = SseDecoder::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        for frame in decoder.feed(&chunk) {
            match frame.event.as_str() {
                "put" | "patch" => {
                    let events = mirror.lock().apply(&frame)?;
                    for event in events {
                        sink(event);
                    }
                }
                "keep-alive" => trace!(path = %path, "event stream keep-alive"),
                "cancel" => return Err(RealtimeError::registration(path, frame.data)),
                "auth_revoked" => {
                    return Err(RealtimeError::registration(path, "auth revoked"));
                }
                other => debug!(path = %path, event = other, "ignoring event"),
            }
        }
    }
    Ok(())
}

/// Local copy of the value under one listener, rebuilt from stream frames.
struct StreamMirror {
    tree: Value,
    view: ListenerView,
}

impl StreamMirror {
    fn new(kind: EventKind) -> Self {
        Self {
            tree: Value::Null,
            view: ListenerView::new(kind),
        }
    }

    fn apply(&mut self, frame: &SseFrame) -> RealtimeResult<Vec<RealtimeEvent>> {
        let payload: Value = serde_json::from_str(&frame.data)?;
        let at = payload
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| RealtimeError::Decode("frame without path".to_string()))?;
        let segments: Vec<&str> = at.split('/').filter(|s| !s.is_empty()).collect();
        let data = payload.get("data").cloned().unwrap_or(Value::Null);

        if frame.event == "patch" {
            let fields = data
                .as_object()
                .ok_or_else(|| RealtimeError::Decode("patch data is not an object".to_string()))?;
            patch_at(&mut self.tree, &segments, fields);
        } else {
            set_at(&mut self.tree, &segments, data);
        }
        Ok(self.view.refresh(&self.tree))
    }
}
