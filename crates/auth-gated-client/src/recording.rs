//! In-memory transport that records calls.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::{ApiError, ApiResult, HttpRequest, HttpResponse, Transport};

#[derive(Debug, Clone)]
enum Canned {
    Reply(Value),
    Status(u16),
}

#[derive(Default)]
struct RecordingState {
    calls: Vec<HttpRequest>,
    canned: HashMap<String, Canned>,
}

/// A [`Transport`] that records every request and answers from canned
/// replies keyed by url path. Unknown paths answer `null`.
#[derive(Default)]
pub struct RecordingTransport {
    state: Mutex<RecordingState>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer requests to `path` with `data`.
    pub fn respond(&self, path: &str, data: Value) {
        self.state
            .lock()
            .canned
            .insert(path.to_string(), Canned::Reply(data));
    }

    /// Answer requests to `path` with a failure status.
    pub fn fail(&self, path: &str, status: u16) {
        self.state
            .lock()
            .canned
            .insert(path.to_string(), Canned::Status(status));
    }

    /// All requests sent so far.
    pub fn calls(&self) -> Vec<HttpRequest> {
        self.state.lock().calls.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.state.lock().calls.clear();
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, request: HttpRequest) -> ApiResult<HttpResponse> {
        let mut state = self.state.lock();
        let canned = state.canned.get(request.url.path()).cloned();
        state.calls.push(request);
        match canned {
            Some(Canned::Reply(data)) => Ok(HttpResponse { status: 200, data }),
            Some(Canned::Status(status)) => Err(ApiError::Status {
                status,
                body_summary: "len=0".to_string(),
            }),
            None => Ok(HttpResponse {
                status: 200,
                data: Value::Null,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Method;
    use serde_json::json;
    use url::Url;

    fn request(path: &str) -> HttpRequest {
        HttpRequest {
            method: Method::Get,
            url: Url::parse("https://acourse.io").unwrap().join(path).unwrap(),
            bearer: None,
            body: None,
        }
    }

    #[tokio::test]
    async fn records_and_answers() {
        let transport = RecordingTransport::new();
        transport.respond("/api/course/c1", json!({"course": {"id": "c1"}}));
        transport.fail("/api/course/missing", 404);

        let ok = transport.send(request("/api/course/c1")).await.unwrap();
        assert_eq!(ok.data["course"]["id"], json!("c1"));
        assert!(matches!(
            transport.send(request("/api/course/missing")).await,
            Err(ApiError::Status { status: 404, .. })
        ));
        assert_eq!(transport.send(request("/other")).await.unwrap().data, Value::Null);
        assert_eq!(transport.len(), 3);

        transport.clear();
        assert!(transport.is_empty());
    }
}
