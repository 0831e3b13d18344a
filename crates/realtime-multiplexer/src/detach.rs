//! Deferred detach of shared listeners.

use std::time::Duration;

use tokio::runtime::Handle;

/// Delay before the default policy detaches an idle listener.
pub const DEFAULT_DETACH_DELAY: Duration = Duration::from_secs(10);

/// When an idle shared listener is physically released.
///
/// After the last consumer of a listener cancels, the hub waits `delay`
/// before calling the backend's `off`. A consumer that attaches to the same
/// path within that window reuses the live registration. With no delay, or
/// without a tokio runtime to run the timer on, detach is immediate.
#[derive(Debug, Clone)]
pub struct DetachPolicy {
    delay: Duration,
    runtime: Option<Handle>,
}

impl DetachPolicy {
    /// Policy with `delay`, timers spawned on the current runtime if any.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            runtime: Handle::try_current().ok(),
        }
    }

    pub fn immediate() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Spawn timers on `runtime` instead of the ambient one.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Runtime on which to run the detach timer, or `None` to detach now.
    pub(crate) fn timer_runtime(&self) -> Option<Handle> {
        if self.delay.is_zero() {
            return None;
        }
        self.runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
    }
}

impl Default for DetachPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_DETACH_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_ten_seconds() {
        assert_eq!(DetachPolicy::default().delay(), Duration::from_secs(10));
    }

    #[test]
    fn no_runtime_means_immediate() {
        let policy = DetachPolicy::default();
        assert!(policy.timer_runtime().is_none());
    }

    #[tokio::test]
    async fn zero_delay_never_spawns() {
        assert!(DetachPolicy::immediate().timer_runtime().is_none());
        assert!(DetachPolicy::default().timer_runtime().is_some());
    }
}
