//! Outbound call descriptions.

use std::fmt;

use serde_json::Value;

/// Prefix REST paths are served under.
pub const REST_PREFIX: &str = "/api";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One API call: where it goes, what it carries and whether it needs a
/// signed-in principal.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    method: Method,
    path: String,
    /// Appended after `path`, each percent-encoded as one segment.
    segments: Vec<String>,
    query: Vec<(String, String)>,
    body: Option<Value>,
    require_auth: bool,
}

impl ApiRequest {
    fn rest(method: Method, path: &str, body: Option<Value>) -> Self {
        Self {
            method,
            path: format!("{}/{}", REST_PREFIX, path.trim_start_matches('/')),
            segments: Vec::new(),
            query: Vec::new(),
            body,
            require_auth: false,
        }
    }

    pub fn get(path: &str) -> Self {
        Self::rest(Method::Get, path, None)
    }

    pub fn post(path: &str, body: Value) -> Self {
        Self::rest(Method::Post, path, Some(body))
    }

    pub fn put(path: &str, body: Value) -> Self {
        Self::rest(Method::Put, path, Some(body))
    }

    pub fn patch(path: &str, body: Value) -> Self {
        Self::rest(Method::Patch, path, Some(body))
    }

    pub fn delete(path: &str) -> Self {
        Self::rest(Method::Delete, path, None)
    }

    /// `POST /{service}/{method}` with `payload` as body.
    pub fn rpc(service: &str, method: &str, payload: Value) -> Self {
        Self {
            method: Method::Post,
            path: format!("/{}/{}", service, method),
            segments: Vec::new(),
            query: Vec::new(),
            body: Some(payload),
            require_auth: false,
        }
    }

    /// Mark the call as needing a signed-in principal.
    pub fn authenticated(mut self) -> Self {
        self.require_auth = true;
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Append one path segment. `/`, `?` and `#` inside it are escaped, so
    /// caller-supplied ids cannot change the route.
    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    /// Append an encoded query pair.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Fixed route prefix, before any [`segment`](Self::segment).
    pub fn route(&self) -> &str {
        &self.path
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    /// Path relative to the API base url, segments unescaped.
    pub fn path(&self) -> String {
        let mut path = self.path.clone();
        for segment in &self.segments {
            path.push('/');
            path.push_str(segment);
        }
        path
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn require_auth(&self) -> bool {
        self.require_auth
    }
}

impl fmt::Display for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path())
    }
}
