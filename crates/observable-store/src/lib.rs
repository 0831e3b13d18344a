//! # Observable Store
//!
//! Keyed cache of last-known-good records shared by every consumer in the
//! process.
//!
//! ## Principles
//!
//! - **Merges never lose fields** - a partial update overlays the previous
//!   snapshot field by field
//! - **Readers get the latest snapshot first** - a late subscriber sees the
//!   current value immediately, then every later change
//! - **One merge path** - hydration, fetch replies and live pushes all go
//!   through [`Record::merge`], applied in arrival order per key
//!
//! ## Example
//!
//! ```rust
//! use observable_store::{CacheKey, Record, Store};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = Store::new();
//! let key = CacheKey::entity("course", "c1");
//!
//! store.merge(&key, Record::try_from(json!({"id": "c1", "title": "Intro"})).unwrap());
//! store.merge(&key, Record::try_from(json!({"attend": "A12"})).unwrap());
//!
//! let mut reader = store.get(&key);
//! let course = reader.next().await.flatten().unwrap();
//! assert_eq!(course.get("title"), Some(&json!("Intro")));
//! assert_eq!(course.get("attend"), Some(&json!("A12")));
//! # }
//! ```

mod hydrate;
mod key;
mod record;
mod store;
mod watched;

pub use hydrate::HydrationState;
pub use key::CacheKey;
pub use record::Record;
pub use store::Store;
pub use watched::{CollectionStream, RecordStream, Watched};

/// Errors produced by the store.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// A record payload was not a JSON object.
    #[error("record payload must be an object, got {0}")]
    NotAnObject(&'static str),
}

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;
