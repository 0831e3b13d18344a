//! The application context: one store, one busy counter, one credential
//! source, one subscription hub and one API client per process.

use std::sync::Arc;

use auth_gated_client::{AuthGatedClient, CredentialSource, HttpTransport, Transport};
use busy_counter::BusyCounter;
use observable_store::{HydrationState, Store};
use parking_lot::Mutex;
use realtime_multiplexer::{
    DetachPolicy, FirebaseRestBackend, RealtimeBackend, RealtimeWriter, SubscriptionHub,
};
use sync_config_and_utils::{Config, CoreError};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::services::{AssignmentService, CourseService, MeService, PaymentService};
use crate::{ServiceError, ServiceResult};

/// Shared sync state (thread-safe). Clones share everything.
#[derive(Clone)]
pub struct AppContext {
    config: Arc<Config>,
    store: Store,
    busy: BusyCounter,
    credentials: CredentialSource,
    hub: SubscriptionHub,
    writer: Arc<dyn RealtimeWriter>,
    client: AuthGatedClient,
    /// Tasks owned by the context, aborted on shutdown.
    background: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl AppContext {
    /// Wire the layer over explicit backends. Must be called inside a tokio
    /// runtime for the deferred detach timer to be armed.
    pub fn new(
        config: Config,
        backend: Arc<dyn RealtimeBackend>,
        writer: Arc<dyn RealtimeWriter>,
        transport: Arc<dyn Transport>,
    ) -> ServiceResult<Self> {
        config.validate()?;
        let api_url = config.api_url()?;
        let credentials = CredentialSource::new();
        let client = AuthGatedClient::new(api_url, transport, credentials.clone())
            .with_strict_auth(config.strict_auth);
        let hub = SubscriptionHub::new(backend, DetachPolicy::new(config.detach_delay()));

        info!(
            api_url = %client.base_url(),
            detach_delay_ms = config.detach_delay_ms,
            strict_auth = config.strict_auth,
            "sync context initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            store: Store::new(),
            busy: BusyCounter::new(),
            credentials,
            hub,
            writer,
            client,
            background: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Wire the layer against the hosted realtime database and the HTTP API.
    /// The database auth token follows the credential source.
    pub fn connect(config: Config) -> ServiceResult<Self> {
        let backend = Arc::new(FirebaseRestBackend::new(
            config.database_url()?,
            config.request_timeout(),
        )?);
        Self::connect_with_backend(config, backend)
    }

    /// Like [`AppContext::connect`] over an already built database backend.
    /// Open event streams are reopened whenever the credential's token
    /// changes.
    pub fn connect_with_backend(
        config: Config,
        backend: Arc<FirebaseRestBackend>,
    ) -> ServiceResult<Self> {
        let transport = Arc::new(HttpTransport::new(config.request_timeout())?);
        let context = Self::new(config, backend.clone(), backend.clone(), transport)?;
        context.follow_credential(backend)?;
        Ok(context)
    }

    fn follow_credential(&self, backend: Arc<FirebaseRestBackend>) -> ServiceResult<()> {
        let runtime = Handle::try_current().map_err(|e| ServiceError::Runtime(e.to_string()))?;
        let mut rx = self.credentials.subscribe();
        let task = runtime.spawn(async move {
            loop {
                let token = rx.borrow_and_update().token().map(str::to_string);
                debug!(signed_in = token.is_some(), "realtime auth token updated");
                backend.set_auth_token(token);
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });
        self.background.lock().push(task);
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn busy(&self) -> &BusyCounter {
        &self.busy
    }

    pub fn credentials(&self) -> &CredentialSource {
        &self.credentials
    }

    pub fn hub(&self) -> &SubscriptionHub {
        &self.hub
    }

    pub fn writer(&self) -> &Arc<dyn RealtimeWriter> {
        &self.writer
    }

    pub fn client(&self) -> &AuthGatedClient {
        &self.client
    }

    /// Pre-seed the store from a server-rendered initial state.
    pub fn hydrate(&self, state: HydrationState) {
        if state.is_empty() {
            debug!("empty hydration state ignored");
            return;
        }
        self.store.hydrate(state);
    }

    pub fn hydrate_json(&self, raw: &str) -> ServiceResult<()> {
        let state = HydrationState::from_json(raw).map_err(CoreError::from)?;
        self.hydrate(state);
        Ok(())
    }

    pub fn courses(&self) -> CourseService {
        CourseService::new(self.clone())
    }

    pub fn assignments(&self) -> AssignmentService {
        AssignmentService::new(self.clone())
    }

    pub fn me(&self) -> MeService {
        MeService::new(self.clone())
    }

    pub fn payments(&self) -> PaymentService {
        PaymentService::new(self.clone())
    }

    /// Detach every listener now, drop pending detach timers, stop owned
    /// tasks and clear the busy state.
    pub fn shutdown(&self) {
        for task in self.background.lock().drain(..) {
            task.abort();
        }
        self.hub.shutdown();
        self.busy.reset();
        info!("sync context shut down");
    }
}
