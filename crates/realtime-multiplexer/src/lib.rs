//! # Realtime Multiplexer
//!
//! Turns push-callback listener registration against a realtime database
//! into cancelable streams, sharing one backend listener between every
//! consumer of the same path.
//!
//! ## Lifecycle
//!
//! ```text
//! observe ──► first consumer? ──yes──► backend.on ──► events fan out
//!                  │ no
//!                  └──► join, replay latest
//! drop    ──► last consumer? ──yes──► wait detach delay ──► still idle? ──► backend.off
//! ```
//!
//! A consumer that arrives during the detach delay supersedes the pending
//! detach and reuses the warm listener.
//!
//! ## Backends
//!
//! - [`MemoryBackend`] - in-process tree, counts registrations
//! - [`FirebaseRestBackend`] - hosted database over REST and event streams

mod backend;
mod detach;
mod error;
mod firebase_rest;
mod hub;
mod memory;
mod path;
mod sse;
mod tree;

pub use backend::{
    children_of, is_server_timestamp, server_timestamp, tag_child, EventSink, ListenerHandle,
    RealtimeBackend, RealtimeEvent, RealtimeWriter,
};
pub use detach::{DetachPolicy, DEFAULT_DETACH_DELAY};
pub use error::{RealtimeError, RealtimeResult};
pub use firebase_rest::FirebaseRestBackend;
pub use hub::{CollectionSubscription, Subscription, SubscriptionHub};
pub use memory::MemoryBackend;
pub use path::{EventKind, RemotePath};
