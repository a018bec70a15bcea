use std::fmt;
use std::sync::mpsc::{Receiver, TryRecvError};

use crate::model::Table;

use super::event::ChangeEvent;

type Release = Box<dyn FnOnce() + Send>;

/// An owned change-feed subscription for one table.
///
/// Events queue on an internal channel until drained. Dropping the handle
/// runs the storage's release hook, so the subscription cannot outlive the
/// board that opened it.
pub struct Subscription {
    table: Table,
    events: Receiver<ChangeEvent>,
    release: Option<Release>,
}

impl Subscription {
    /// Wrap a receiving channel. `release` runs exactly once, on drop.
    #[must_use]
    pub fn new(table: Table, events: Receiver<ChangeEvent>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            table,
            events,
            release: Some(Box::new(release)),
        }
    }

    #[must_use]
    pub const fn table(&self) -> Table {
        self.table
    }

    /// Every event currently queued, in arrival order. Never blocks.
    pub fn drain(&self) -> Vec<ChangeEvent> {
        let mut out = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => out.push(event),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        out
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("table", &self.table)
            .field("released", &self.release.is_none())
            .finish_non_exhaustive()
    }
}

/// The set of subscriptions one open board holds, one per table.
#[derive(Debug, Default)]
pub struct BoardFeed {
    subscriptions: Vec<Subscription>,
}

impl BoardFeed {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            subscriptions: Vec::new(),
        }
    }

    pub fn push(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    #[must_use]
    pub fn tables(&self) -> Vec<Table> {
        self.subscriptions.iter().map(Subscription::table).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Drain every subscription, parent tables first.
    ///
    /// Cross-table order is not guaranteed by the feed anyway; draining
    /// parents first only makes parking less frequent.
    pub fn drain(&self) -> Vec<ChangeEvent> {
        let mut subscriptions: Vec<&Subscription> = self.subscriptions.iter().collect();
        subscriptions.sort_by_key(|s| s.table());
        subscriptions.into_iter().flat_map(Subscription::drain).collect()
    }

    /// Release every subscription now.
    pub fn release(&mut self) {
        self.subscriptions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    fn event(table: Table, id: &str) -> ChangeEvent {
        let mut row = crate::model::Row::new();
        row.insert("id".into(), id.into());
        ChangeEvent::delete(table, row)
    }

    #[test]
    fn drop_runs_release_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let (_tx, rx) = mpsc::channel();
        let counter = Arc::clone(&released);
        let sub = Subscription::new(Table::Tasks, rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(sub);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn feed_drains_parents_first() {
        let (task_tx, task_rx) = mpsc::channel();
        let (col_tx, col_rx) = mpsc::channel();
        let mut feed = BoardFeed::new();
        feed.push(Subscription::new(Table::Tasks, task_rx, || {}));
        feed.push(Subscription::new(Table::Columns, col_rx, || {}));

        task_tx.send(event(Table::Tasks, "t1")).expect("send");
        col_tx.send(event(Table::Columns, "c1")).expect("send");
        task_tx.send(event(Table::Tasks, "t2")).expect("send");

        let ids: Vec<String> = feed
            .drain()
            .iter()
            .filter_map(|e| e.row_id().map(str::to_string))
            .collect();
        assert_eq!(ids, ["c1", "t1", "t2"]);
        assert!(feed.drain().is_empty());
    }

    #[test]
    fn release_empties_the_feed() {
        let (_tx, rx) = mpsc::channel();
        let mut feed = BoardFeed::new();
        feed.push(Subscription::new(Table::Tasks, rx, || {}));
        assert!(!feed.is_empty());
        feed.release();
        assert!(feed.is_empty());
    }
}
