//! # Auth-Gated Client
//!
//! Issues RPC and REST calls against the course API, attaching the ambient
//! bearer credential when there is one.
//!
//! The credential has three states ([`Credential`]): unknown while the
//! sign-in layer is still loading, unauthenticated, or a bearer token. Calls
//! wait out the unknown state; calls that require a signed-in user are not
//! sent at all when there is none.
//!
//! ```text
//! invoke(request)
//!   └─► CredentialSource::resolve   (waits while Unknown)
//!         ├─ required + signed out ─► Invocation::Skipped
//!         └─ otherwise ─► Transport::send ─► Invocation::Completed(data)
//! ```

mod client;
mod credential;
mod error;
mod recording;
pub mod replies;
mod request;
mod transport;

pub use client::{AuthGatedClient, Invocation};
pub use credential::{Credential, CredentialSource};
pub use error::{ApiError, ApiResult};
pub use recording::RecordingTransport;
pub use request::{ApiRequest, Method, REST_PREFIX};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Transport};
