//! # Course Sync Runtime
//!
//! The application context and the services that sit on the sync layer.
//!
//! [`AppContext`] is built once at startup and cloned into every consumer;
//! it owns the single store, busy counter, credential source, subscription
//! hub and API client. There are no process-wide singletons.
//!
//! ```text
//! AppContext ─┬─ Store            (cached records, replay-latest readers)
//!             ├─ BusyCounter      (one guard per network-bound call)
//!             ├─ CredentialSource ─► AuthGatedClient ─► Transport
//!             └─ SubscriptionHub  ─► RealtimeBackend
//! ```
//!
//! Services ([`CourseService`], [`AssignmentService`], [`MeService`],
//! [`PaymentService`]) are cheap handles obtained from the context.

mod context;
mod error;
mod services;

pub use context::AppContext;
pub use error::{ServiceError, ServiceResult};
pub use services::{AssignmentService, CourseService, LiveFollow, MeService, PaymentService};

pub use auth_gated_client::{Credential, Invocation, RecordingTransport};
pub use observable_store::{CacheKey, HydrationState, Record};
pub use realtime_multiplexer::MemoryBackend;
