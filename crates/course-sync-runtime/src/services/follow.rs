//! Live followers: background tasks that fold a shared realtime stream into
//! the store.

use futures_util::StreamExt;
use observable_store::{CacheKey, Record, Store};
use realtime_multiplexer::{RemotePath, Subscription};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::{ServiceError, ServiceResult};

/// Handle of a running follower. Dropping it stops the follower and releases
/// its subscription, which arms the deferred detach.
#[derive(Debug)]
#[must_use = "the follower stops when the handle is dropped"]
pub struct LiveFollow {
    path: RemotePath,
    key: CacheKey,
    task: JoinHandle<()>,
}

impl LiveFollow {
    /// Merge every value pushed on `subscription` into `key`, tagged with
    /// `id`. Absent values leave the cache alone.
    pub(crate) fn spawn(
        store: Store,
        key: CacheKey,
        id: String,
        mut subscription: Subscription,
    ) -> ServiceResult<Self> {
        let runtime = Handle::try_current().map_err(|e| ServiceError::Runtime(e.to_string()))?;
        let path = subscription.path().clone();
        let task_key = key.clone();
        let task = runtime.spawn(async move {
            while let Some(item) = subscription.next().await {
                match item {
                    Ok(Value::Object(fields)) => {
                        let partial = Record::from_map(fields).with("id", Value::String(id.clone()));
                        store.merge(&task_key, partial);
                    }
                    Ok(Value::Null) => trace!(key = %task_key, "nothing at followed path"),
                    Ok(other) => {
                        warn!(key = %task_key, value = %other, "non-object pushed to followed path")
                    }
                    Err(err) => {
                        warn!(key = %task_key, error = %err, "live follow ended");
                        return;
                    }
                }
            }
            debug!(key = %task_key, "live follow stream closed");
        });
        debug!(path = %path, key = %key, "live follow started");
        Ok(Self { path, key, task })
    }

    pub fn path(&self) -> &RemotePath {
        &self.path
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// False once the stream has ended or failed.
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn stop(self) {}
}

impl Drop for LiveFollow {
    fn drop(&mut self) {
        self.task.abort();
    }
}
