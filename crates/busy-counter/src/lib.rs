//! # Busy Counter
//!
//! A set of named reference counts that answers one question: is anything in
//! flight right now?
//!
//! - `start(name)` increments, `stop(name)` decrements, never below zero.
//! - `is_busy()` is recomputed from the whole counter set on every change,
//!   never tracked incrementally.
//! - `reset()` clears everything (navigation boundaries).
//!
//! ```rust
//! use busy_counter::BusyCounter;
//!
//! let busy = BusyCounter::new();
//! busy.start("router");
//! assert!(busy.is_busy());
//! busy.stop("router");
//! assert!(!busy.is_busy());
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::trace;

#[derive(Debug)]
struct Inner {
    counts: Mutex<HashMap<String, u32>>,
    busy_tx: watch::Sender<bool>,
}

/// Shared handle to the busy counter set. Clones share state.
#[derive(Debug, Clone)]
pub struct BusyCounter {
    inner: Arc<Inner>,
}

impl BusyCounter {
    pub fn new() -> Self {
        let (busy_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                counts: Mutex::new(HashMap::new()),
                busy_tx,
            }),
        }
    }

    fn counts(&self) -> MutexGuard<'_, HashMap<String, u32>> {
        // Counts are plain integers; a panic elsewhere cannot leave them torn.
        self.inner
            .counts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Increment the counter for `name`.
    pub fn start(&self, name: &str) {
        let mut counts = self.counts();
        let count = counts.entry(name.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        trace!(name, count = *count, "busy start");
        self.publish(&counts);
    }

    /// Decrement the counter for `name`. A stop without a matching start is
    /// a no-op.
    pub fn stop(&self, name: &str) {
        let mut counts = self.counts();
        let Some(count) = counts.get_mut(name) else {
            trace!(name, "busy stop without start ignored");
            return;
        };
        *count = count.saturating_sub(1);
        trace!(name, count = *count, "busy stop");
        if *count == 0 {
            counts.remove(name);
        }
        self.publish(&counts);
    }

    /// Clear every counter.
    pub fn reset(&self) {
        let mut counts = self.counts();
        if !counts.is_empty() {
            trace!(names = counts.len(), "busy reset");
        }
        counts.clear();
        self.publish(&counts);
    }

    /// True iff at least one named counter is above zero.
    pub fn is_busy(&self) -> bool {
        Self::any_positive(&self.counts())
    }

    /// True iff `name` has outstanding starts.
    pub fn has(&self, name: &str) -> bool {
        self.count(name) > 0
    }

    /// Outstanding starts for `name`.
    pub fn count(&self, name: &str) -> u32 {
        self.counts().get(name).copied().unwrap_or(0)
    }

    /// Number of distinct names currently busy.
    pub fn active(&self) -> usize {
        self.counts().values().filter(|count| **count > 0).count()
    }

    /// Watch the aggregate busy flag. The receiver holds the current value
    /// immediately and is notified only when the flag flips.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.busy_tx.subscribe()
    }

    /// Start `name` and stop it again when the guard drops.
    pub fn guard(&self, name: &str) -> BusyGuard {
        self.start(name);
        BusyGuard {
            counter: self.clone(),
            name: name.to_string(),
        }
    }

    fn any_positive(counts: &HashMap<String, u32>) -> bool {
        counts.values().any(|count| *count > 0)
    }

    fn publish(&self, counts: &HashMap<String, u32>) {
        let busy = Self::any_positive(counts);
        self.inner.busy_tx.send_if_modified(|current| {
            if *current == busy {
                false
            } else {
                *current = busy;
                true
            }
        });
    }
}

impl Default for BusyCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII handle returned by [`BusyCounter::guard`].
#[derive(Debug)]
#[must_use = "the operation is only marked busy while the guard is alive"]
pub struct BusyGuard {
    counter: BusyCounter,
    name: String,
}

impl BusyGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.counter.stop(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_starts_need_matching_stops() {
        let busy = BusyCounter::new();
        busy.start("x");
        busy.start("x");
        busy.stop("x");
        assert!(busy.has("x"));
        assert!(busy.is_busy());

        busy.stop("x");
        assert!(!busy.has("x"));
        assert!(!busy.is_busy());
    }

    #[test]
    fn unmatched_stop_is_ignored() {
        let busy = BusyCounter::new();
        busy.stop("y");
        assert!(!busy.is_busy());
        assert!(!busy.has("y"));
        assert_eq!(busy.count("y"), 0);

        busy.start("y");
        assert_eq!(busy.count("y"), 1);
    }

    #[test]
    fn extra_stop_does_not_go_negative() {
        let busy = BusyCounter::new();
        busy.start("submit");
        busy.stop("submit");
        busy.stop("submit");
        busy.start("submit");
        assert!(busy.has("submit"));
        assert_eq!(busy.count("submit"), 1);
    }

    #[test]
    fn names_are_independent() {
        let busy = BusyCounter::new();
        busy.start("router");
        busy.start("submit");
        busy.stop("router");
        assert!(busy.is_busy());
        assert_eq!(busy.active(), 1);
        assert!(busy.has("submit"));
        assert!(!busy.has("router"));
    }

    #[test]
    fn reset_clears_everything() {
        let busy = BusyCounter::new();
        busy.start("router");
        busy.start("router");
        busy.start("upload");
        busy.reset();
        assert!(!busy.is_busy());
        assert_eq!(busy.active(), 0);

        // A late stop from the aborted operation stays harmless.
        busy.stop("router");
        assert!(!busy.is_busy());
    }

    #[test]
    fn guard_stops_on_drop() {
        let busy = BusyCounter::new();
        {
            let guard = busy.guard("fetch");
            assert_eq!(guard.name(), "fetch");
            assert!(busy.has("fetch"));
        }
        assert!(!busy.has("fetch"));
    }

    #[test]
    fn clones_share_state() {
        let busy = BusyCounter::new();
        let other = busy.clone();
        busy.start("x");
        assert!(other.is_busy());
        other.stop("x");
        assert!(!busy.is_busy());
    }

    #[tokio::test]
    async fn subscribers_see_flag_flips_only() {
        let busy = BusyCounter::new();
        let mut rx = busy.subscribe();
        assert!(!*rx.borrow_and_update());

        busy.start("a");
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());

        // Still busy: no notification.
        busy.start("b");
        busy.stop("a");
        assert!(!rx.has_changed().unwrap());

        busy.stop("b");
        rx.changed().await.unwrap();
        assert!(!*rx.borrow_and_update());
    }
}
