//! The auth-gated request client.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::{ApiError, ApiRequest, ApiResult, CredentialSource, HttpRequest, Transport};

/// Outcome of [`AuthGatedClient::invoke`].
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// The call went out; carries the reply payload.
    Completed(Value),
    /// The call needed a credential and nobody is signed in, so nothing
    /// was sent.
    Skipped,
}

impl Invocation {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Invocation::Skipped)
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Invocation::Completed(value) => Some(value),
            Invocation::Skipped => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Invocation::Completed(value) => Some(value),
            Invocation::Skipped => None,
        }
    }
}

/// Issues API calls with the ambient credential attached.
///
/// Every call first resolves the credential, waiting while it is still
/// unknown. A call marked [`ApiRequest::authenticated`] is only sent when a
/// bearer token is present; otherwise it resolves to [`Invocation::Skipped`],
/// or to [`ApiError::Unauthenticated`] with strict auth on. Failures are
/// returned as-is, never retried.
#[derive(Clone)]
pub struct AuthGatedClient {
    base_url: Url,
    transport: Arc<dyn Transport>,
    credentials: CredentialSource,
    strict_auth: bool,
}

impl AuthGatedClient {
    pub fn new(base_url: Url, transport: Arc<dyn Transport>, credentials: CredentialSource) -> Self {
        Self {
            base_url,
            transport,
            credentials,
            strict_auth: false,
        }
    }

    /// Turn skipped calls into [`ApiError::Unauthenticated`].
    pub fn with_strict_auth(mut self, strict_auth: bool) -> Self {
        self.strict_auth = strict_auth;
        self
    }

    pub fn credentials(&self) -> &CredentialSource {
        &self.credentials
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, request: &ApiRequest) -> ApiResult<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let mut url = Url::parse(&format!("{}{}", base, request.route()))?;
        if !request.segments().is_empty() {
            url.path_segments_mut()
                .map_err(|_| ApiError::Transport(format!("{} cannot take path segments", base)))?
                .extend(request.segments());
        }
        if !request.query_pairs().is_empty() {
            url.query_pairs_mut().extend_pairs(request.query_pairs());
        }
        Ok(url)
    }

    pub async fn invoke(&self, request: ApiRequest) -> ApiResult<Invocation> {
        let credential = self.credentials.resolve().await?;

        if request.require_auth() && !credential.is_authenticated() {
            if self.strict_auth {
                warn!(request = %request, "authenticated call refused while signed out");
                return Err(ApiError::Unauthenticated {
                    endpoint: request.path(),
                });
            }
            debug!(request = %request, "authenticated call skipped while signed out");
            return Ok(Invocation::Skipped);
        }

        let http_request = HttpRequest {
            method: request.method(),
            url: self.endpoint(&request)?,
            bearer: credential.token().map(str::to_string),
            body: request.body().cloned(),
        };
        let response = match self.transport.send(http_request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(request = %request, error = %err, "API call failed");
                return Err(err);
            }
        };
        info!(request = %request, status = response.status, "API call completed");
        Ok(Invocation::Completed(response.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Credential, RecordingTransport};
    use serde_json::json;

    fn client(base: &str) -> (AuthGatedClient, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::new());
        let client = AuthGatedClient::new(
            Url::parse(base).unwrap(),
            transport.clone(),
            CredentialSource::new(),
        );
        (client, transport)
    }

    #[tokio::test]
    async fn public_call_goes_out_without_header() {
        let (client, transport) = client("https://acourse.io");
        client.credentials().sign_out();
        transport.respond("/api/course/c1", json!({"course": {"id": "c1"}}));

        let result = client.invoke(ApiRequest::get("/course/c1")).await.unwrap();
        assert_eq!(result.value().unwrap()["course"]["id"], json!("c1"));
        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].bearer, None);
        assert_eq!(calls[0].url.as_str(), "https://acourse.io/api/course/c1");
    }

    #[tokio::test]
    async fn public_call_carries_token_when_signed_in() {
        let (client, transport) = client("https://acourse.io/");
        client.credentials().publish(Credential::Bearer("tok".into()));
        client
            .invoke(ApiRequest::rpc("acourse.CourseService", "ListCourses", json!({})))
            .await
            .unwrap();
        let calls = transport.calls();
        assert_eq!(calls[0].bearer.as_deref(), Some("tok"));
        assert_eq!(calls[0].url.path(), "/acourse.CourseService/ListCourses");
    }

    #[tokio::test]
    async fn base_path_is_kept() {
        let (client, transport) = client("https://acourse.io/v1");
        client.credentials().sign_out();
        client.invoke(ApiRequest::get("/course")).await.unwrap();
        assert_eq!(transport.calls()[0].url.path(), "/v1/api/course");
    }

    #[tokio::test]
    async fn ids_are_escaped_into_one_segment() {
        let (client, transport) = client("https://acourse.io");
        client.credentials().sign_out();
        client
            .invoke(ApiRequest::get("/course").segment("c1/enroll?x#y"))
            .await
            .unwrap();
        client
            .invoke(ApiRequest::get("/course").query("owner", "u1&student=u2"))
            .await
            .unwrap();

        let calls = transport.calls();
        assert_eq!(calls[0].url.path(), "/api/course/c1%2Fenroll%3Fx%23y");
        assert_eq!(calls[0].url.query(), None);
        assert_eq!(calls[1].url.path(), "/api/course");
        let pairs: Vec<(String, String)> = calls[1].url.query_pairs().into_owned().collect();
        assert_eq!(pairs, vec![("owner".to_string(), "u1&student=u2".to_string())]);
    }

    #[tokio::test]
    async fn strict_mode_reports_unauthenticated() {
        let (client, transport) = client("https://acourse.io");
        let client = client.with_strict_auth(true);
        client.credentials().sign_out();

        let err = client
            .invoke(ApiRequest::get("/me").authenticated())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated { ref endpoint } if endpoint == "/api/me"));
        assert!(transport.is_empty());
    }

    #[tokio::test]
    async fn failures_surface_without_retry() {
        let (client, transport) = client("https://acourse.io");
        client.credentials().sign_in("tok");
        transport.fail("/api/course/c1/enroll", 500);

        let err = client
            .invoke(ApiRequest::put("/course/c1/enroll", json!({"code": ""})).authenticated())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 500, .. }));
        assert_eq!(transport.len(), 1);
    }

    #[test]
    fn invocation_accessors() {
        assert!(Invocation::Skipped.is_skipped());
        assert_eq!(Invocation::Skipped.into_value(), None);
        assert_eq!(
            Invocation::Completed(json!(1)).into_value(),
            Some(json!(1))
        );
    }
}
