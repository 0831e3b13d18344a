//! Ambient credential and its three states.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::{ApiError, ApiResult};

/// What is known about the signed-in principal.
///
/// `Unknown` and `Unauthenticated` are different answers: the first means
/// the sign-in layer has not reported yet, the second that it has and nobody
/// is signed in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Credential {
    #[default]
    Unknown,
    Unauthenticated,
    Bearer(String),
}

impl Credential {
    /// `None` and empty tokens both mean signed out.
    pub fn from_token(token: Option<String>) -> Self {
        match token {
            Some(token) if !token.is_empty() => Credential::Bearer(token),
            _ => Credential::Unauthenticated,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Credential::Unknown)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Credential::Bearer(_))
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            Credential::Bearer(token) => Some(token),
            _ => None,
        }
    }

    fn normalized(self) -> Self {
        match self {
            Credential::Bearer(token) if token.is_empty() => Credential::Unauthenticated,
            other => other,
        }
    }
}

/// Publishes the current credential to everyone who needs it.
///
/// Starts out `Unknown`. The sign-in layer publishes a definitive value once
/// it knows, and again on every sign-in, sign-out and token refresh.
#[derive(Clone)]
pub struct CredentialSource {
    tx: Arc<watch::Sender<Credential>>,
}

impl CredentialSource {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Credential::Unknown);
        Self { tx: Arc::new(tx) }
    }

    pub fn publish(&self, credential: Credential) {
        let credential = credential.normalized();
        debug!(
            known = credential.is_known(),
            authenticated = credential.is_authenticated(),
            "credential published"
        );
        self.tx.send_replace(credential);
    }

    pub fn sign_in(&self, token: impl Into<String>) {
        self.publish(Credential::Bearer(token.into()));
    }

    pub fn sign_out(&self) {
        self.publish(Credential::Unauthenticated);
    }

    /// Credential at this instant, possibly `Unknown`.
    pub fn current(&self) -> Credential {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Credential> {
        self.tx.subscribe()
    }

    /// First definitive credential: returns at once when one is known,
    /// otherwise waits for the sign-in layer to publish.
    pub async fn resolve(&self) -> ApiResult<Credential> {
        let mut rx = self.tx.subscribe();
        let credential = rx
            .wait_for(Credential::is_known)
            .await
            .map_err(|_| ApiError::CredentialClosed)?;
        Ok(credential.clone())
    }
}

impl Default for CredentialSource {
    fn default() -> Self {
        Self::new()
    }
}
