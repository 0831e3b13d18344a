//! Wire transport seam and its HTTP implementation.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::{ApiError, ApiResult, Method};

pub(crate) fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// A fully resolved call, ready for the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub bearer: Option<String>,
    pub body: Option<Value>,
}

/// Successful reply. `data` is the decoded body (`Null` when empty).
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub data: Value,
}

/// Sends resolved calls. Non-success statuses are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> ApiResult<HttpResponse>;
}

/// [`Transport`] over reqwest.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> ApiResult<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: HttpRequest) -> ApiResult<HttpResponse> {
        let mut builder = match request.method {
            Method::Get => self.http_client.get(request.url.clone()),
            Method::Post => self.http_client.post(request.url.clone()),
            Method::Put => self.http_client.put(request.url.clone()),
            Method::Patch => self.http_client.patch(request.url.clone()),
            Method::Delete => self.http_client.delete(request.url.clone()),
        };
        builder = builder.header("Accept", "application/json");
        if let Some(token) = &request.bearer {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!(method = %request.method, url = %request.url.path(), "sending API request");
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body_summary = summarize_response_body(&body);
            tracing::error!(
                status = %status,
                body_summary = %body_summary,
                path = %request.url.path(),
                "API request failed"
            );
            return Err(ApiError::Status {
                status: status.as_u16(),
                body_summary,
            });
        }

        let body = response.text().await?;
        let data = if body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&body)?
        };
        Ok(HttpResponse {
            status: status.as_u16(),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_is_stable_and_opaque() {
        let a = summarize_response_body("{\"error\":\"forbidden\"}");
        let b = summarize_response_body("{\"error\":\"forbidden\"}");
        assert_eq!(a, b);
        assert!(a.starts_with("len=21,"));
        assert!(!a.contains("forbidden"));
    }

    #[test]
    fn builds_with_timeout() {
        assert!(HttpTransport::new(Duration::from_secs(30)).is_ok());
    }
}
