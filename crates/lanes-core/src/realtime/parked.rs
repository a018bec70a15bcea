//! Deliverable events that arrived before their task.
//!
//! The feed guarantees per-row order only. A deliverable INSERT can beat
//! the INSERT of the task that holds it; without a place to wait, the
//! event would be ignored and the deliverable lost until the next refetch.

use std::collections::BTreeMap;

use tracing::warn;

use super::event::ChangeEvent;

#[derive(Debug, Clone, Default)]
pub struct ParkedEvents {
    by_task: BTreeMap<String, Vec<ChangeEvent>>,
    len: usize,
    capacity: usize,
}

impl ParkedEvents {
    #[must_use]
    pub const fn with_capacity(capacity: usize) -> Self {
        Self {
            by_task: BTreeMap::new(),
            len: 0,
            capacity,
        }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Park `event` until `task_id` appears. Returns `false` (and drops the
    /// event) when the buffer is full.
    pub fn park(&mut self, task_id: &str, event: ChangeEvent) -> bool {
        if self.len >= self.capacity {
            warn!(task_id, capacity = self.capacity, "parked event buffer full, dropping event");
            return false;
        }
        self.by_task.entry(task_id.to_string()).or_default().push(event);
        self.len += 1;
        true
    }

    /// Take every event waiting on `task_id`, in arrival order.
    pub fn take(&mut self, task_id: &str) -> Vec<ChangeEvent> {
        let events = self.by_task.remove(task_id).unwrap_or_default();
        self.len -= events.len();
        events
    }

    /// Task ids with at least one parked event.
    pub fn waiting_on(&self) -> impl Iterator<Item = &str> {
        self.by_task.keys().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.by_task.clear();
        self.len = 0;
    }
}
