//! Fault-injecting change-feed delivery.
//!
//! Every event storage emits is fanned out to every client with a random
//! delay. Some deliveries are duplicated and some rounds are shuffled.
//! Per-row order is always kept.

use std::collections::BTreeMap;

use lanes_core::model::Table;
use lanes_core::realtime::ChangeEvent;
use serde::{Deserialize, Serialize};

use crate::client::ClientId;
use crate::rng::DeterministicRng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Maximum delivery delay in rounds.
    pub max_delay_rounds: u8,
    /// Percentage of deliveries duplicated.
    pub duplicate_rate_percent: u8,
    /// Percentage chance of shuffling a round's ready events.
    pub reorder_rate_percent: u8,
    /// Percentage chance that a client's flush hits an unavailable
    /// storage on its first write.
    pub write_failure_percent: u8,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            max_delay_rounds: 2,
            duplicate_rate_percent: 5,
            reorder_rate_percent: 10,
            write_failure_percent: 0,
        }
    }
}

type RowKey = (ClientId, Table, String);

#[derive(Debug, Clone)]
struct PendingEvent {
    deliver_at_round: u64,
    to: ClientId,
    event: ChangeEvent,
}

impl PendingEvent {
    fn key(&self) -> RowKey {
        (
            self.to,
            self.event.table,
            self.event.row_id().unwrap_or_default().to_string(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOutcome {
    pub duplicated: bool,
    pub delay_rounds: u64,
}

#[derive(Debug, Clone)]
pub struct DeliverOutcome {
    pub delivered: Vec<(ClientId, ChangeEvent)>,
    pub reordered: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedFeed {
    pending: Vec<PendingEvent>,
    /// Latest delivery round scheduled per (client, table, row).
    horizon: BTreeMap<RowKey, u64>,
    fault: FaultConfig,
}

impl SimulatedFeed {
    #[must_use]
    pub fn new(fault: FaultConfig) -> Self {
        Self {
            pending: Vec::new(),
            horizon: BTreeMap::new(),
            fault,
        }
    }

    #[must_use]
    pub const fn fault_config(&self) -> FaultConfig {
        self.fault
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Schedule `event` for `to`. The delay never lets it overtake an
    /// earlier event about the same row.
    pub fn send(&mut self, to: ClientId, event: ChangeEvent, round: u64, rng: &mut DeterministicRng) -> SendOutcome {
        let bound = u64::from(self.fault.max_delay_rounds).saturating_add(1);
        let delay = rng.next_bounded(bound);
        let mut pending = PendingEvent {
            deliver_at_round: round.saturating_add(delay),
            to,
            event,
        };
        let key = pending.key();
        let floor = self.horizon.get(&key).copied().unwrap_or(0);
        pending.deliver_at_round = pending.deliver_at_round.max(floor);
        self.horizon.insert(key, pending.deliver_at_round);

        let duplicated = rng.hit_rate_percent(self.fault.duplicate_rate_percent);
        if duplicated {
            self.pending.push(pending.clone());
        }
        self.pending.push(pending);

        SendOutcome {
            duplicated,
            delay_rounds: delay,
        }
    }

    /// Deliver everything due by `round`.
    pub fn deliver_ready(&mut self, round: u64, rng: &mut DeterministicRng) -> DeliverOutcome {
        let (ready, future): (Vec<PendingEvent>, Vec<PendingEvent>) = self
            .pending
            .drain(..)
            .partition(|p| p.deliver_at_round <= round);
        self.pending = future;

        let reordered = ready.len() > 1 && rng.hit_rate_percent(self.fault.reorder_rate_percent);
        let ready = if reordered { shuffle_keeping_rows(ready, rng) } else { ready };

        DeliverOutcome {
            delivered: ready.into_iter().map(|p| (p.to, p.event)).collect(),
            reordered,
        }
    }

    /// Deliver everything still in flight, in scheduling order.
    pub fn drain_all(&mut self) -> Vec<(ClientId, ChangeEvent)> {
        self.horizon.clear();
        self.pending.drain(..).map(|p| (p.to, p.event)).collect()
    }
}

/// Shuffle slots across rows, then refill each row's slots with that row's
/// events in their original order.
fn shuffle_keeping_rows(ready: Vec<PendingEvent>, rng: &mut DeterministicRng) -> Vec<PendingEvent> {
    let mut order: Vec<usize> = (0..ready.len()).collect();
    for i in (1..order.len()).rev() {
        if let Some(j) = rng.index(i + 1) {
            order.swap(i, j);
        }
    }

    let mut by_row: BTreeMap<RowKey, Vec<PendingEvent>> = BTreeMap::new();
    let slot_keys: Vec<RowKey> = order.iter().map(|&i| ready[i].key()).collect();
    for pending in ready {
        by_row.entry(pending.key()).or_default().push(pending);
    }
    for events in by_row.values_mut() {
        events.reverse();
    }

    slot_keys
        .into_iter()
        .filter_map(|key| by_row.get_mut(&key).and_then(Vec::pop))
        .collect()
}
