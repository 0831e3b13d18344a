//! Replay-latest reader over a store entry.

use futures_util::Stream;
use tokio::sync::watch;

/// Reader of one store entry: yields the current snapshot first, then each
/// later snapshot.
///
/// `None` snapshots mean "nothing cached yet". Readers that fall behind skip
/// intermediate snapshots and resume at the newest one; the sequence they see
/// is always in write order.
#[derive(Debug)]
pub struct Watched<T> {
    rx: watch::Receiver<Option<T>>,
    primed: bool,
}

/// Reader of a single entity.
pub type RecordStream = Watched<crate::Record>;

/// Reader of a list view.
pub type CollectionStream = Watched<Vec<crate::Record>>;

impl<T: Clone + Send + Sync + 'static> Watched<T> {
    pub(crate) fn new(rx: watch::Receiver<Option<T>>) -> Self {
        Self { rx, primed: false }
    }

    /// Snapshot at this instant, without consuming an update.
    pub fn current(&self) -> Option<T> {
        self.rx.borrow().clone()
    }

    /// Next snapshot. The first call returns immediately with the current
    /// value. Returns `None` once the store is gone.
    pub async fn next(&mut self) -> Option<Option<T>> {
        if !self.primed {
            self.primed = true;
            return Some(self.rx.borrow_and_update().clone());
        }
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Next snapshot that is actually defined.
    pub async fn next_defined(&mut self) -> Option<T> {
        loop {
            if let Some(value) = self.next().await? {
                return Some(value);
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Option<T>> + Send + 'static {
        futures_util::stream::unfold(self, |mut reader| async move {
            let item = reader.next().await?;
            Some((item, reader))
        })
    }
}

impl<T> Clone for Watched<T> {
    /// The clone starts over: its first `next` replays the current value.
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
            primed: false,
        }
    }
}
