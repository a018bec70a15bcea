//! lanes-sim library.
//!
//! Deterministic multi-client simulation: several boards share one
//! [`MemoryStorage`], act at random, and learn about each other only
//! through a fault-injecting change feed. At the end every client must
//! agree with storage.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod campaign;
pub mod client;
pub mod feed;
pub mod oracle;
pub mod rng;

use anyhow::{Context, Result, bail};
use chrono::{TimeZone, Utc};
use lanes_core::config::LanesConfig;
use lanes_core::model::{Column, Entity, Project, Table};
use lanes_core::realtime::{ChangeKind, MergeOutcome, Subscription};
use lanes_core::storage::{MemoryStorage, Storage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::{Action, ActionOutcome, ClientId, SimClient};
use crate::feed::{FaultConfig, SimulatedFeed};
use crate::oracle::{ConvergenceOracle, OracleResult};
use crate::rng::DeterministicRng;

pub const PROJECT_ID: &str = "sim-project";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub client_count: usize,
    pub rounds: u64,
    /// Actions each client takes per round.
    pub actions_per_round: usize,
    /// Chance a client flushes its outbox at the end of a round.
    pub flush_percent: u8,
    pub fault: FaultConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            client_count: 3,
            rounds: 24,
            actions_per_round: 2,
            flush_percent: 70,
            fault: FaultConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEventKind {
    Act {
        client: ClientId,
        action: Action,
        outcome: ActionOutcome,
    },
    Flush {
        client: ClientId,
        writes: usize,
        failures: usize,
    },
    Deliver {
        client: ClientId,
        table: Table,
        change: ChangeKind,
        applied: bool,
    },
    Reorder {
        events: usize,
    },
    Refetch {
        client: ClientId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub round: u64,
    #[serde(flatten)]
    pub kind: TraceEventKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationStats {
    pub actions_applied: usize,
    pub actions_rejected: usize,
    pub writes: usize,
    pub write_failures: usize,
    pub delivered: usize,
    pub duplicated: usize,
    pub reordered_rounds: usize,
    pub parked_peak: usize,
    pub malformed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationResult {
    pub seed: u64,
    pub trace: Vec<TraceEvent>,
    pub stats: SimulationStats,
    /// Clients reloaded from storage before the check because injected
    /// write failures leave accepted drift behind.
    pub refetched: bool,
    pub oracle: OracleResult,
    /// Entities in storage at the end.
    pub entity_count: usize,
    pub interesting_state_reached: bool,
}

impl SimulationResult {
    /// FNV-1a over the serialized trace. Two runs of one seed must agree.
    #[must_use]
    pub fn trace_fingerprint(&self) -> u64 {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;
        let bytes = serde_json::to_vec(&self.trace).unwrap_or_default();
        bytes
            .iter()
            .fold(OFFSET, |hash, &b| (hash ^ u64::from(b)).wrapping_mul(PRIME))
    }
}

pub struct Simulator {
    config: SimulationConfig,
    rng: DeterministicRng,
    storage: MemoryStorage,
    clients: Vec<SimClient>,
    taps: Vec<Subscription>,
    feed: SimulatedFeed,
    trace: Vec<TraceEvent>,
    stats: SimulationStats,
}

impl Simulator {
    /// Seed a shared storage with one project and three columns, tap its
    /// change feed, and open every client.
    ///
    /// # Errors
    ///
    /// Fails on a zero client count or when storage cannot be seeded.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        if config.client_count == 0 {
            bail!("client_count must be > 0");
        }

        let base = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .context("simulation clock base")?;
        let storage = MemoryStorage::with_logical_clock(base);
        seed_board(&storage)?;

        let taps = Table::ALL
            .iter()
            .map(|&table| storage.subscribe(table, None))
            .collect::<Result<Vec<_>, _>>()
            .context("tap change feed")?;

        let clients = (0..config.client_count)
            .map(|id| SimClient::open(id, storage.clone(), PROJECT_ID, LanesConfig::default()))
            .collect::<Result<Vec<_>, _>>()
            .context("open client boards")?;

        Ok(Self {
            rng: DeterministicRng::new(config.seed),
            feed: SimulatedFeed::new(config.fault),
            config,
            storage,
            clients,
            taps,
            trace: Vec::new(),
            stats: SimulationStats::default(),
        })
    }

    /// Run every round, then flush, drain and check.
    ///
    /// # Errors
    ///
    /// Fails when storage truth cannot be read back or a refetch fails.
    pub fn run(&mut self) -> Result<SimulationResult> {
        for round in 0..self.config.rounds {
            self.step(round);
        }

        let end = self.config.rounds;
        for client in 0..self.clients.len() {
            self.flush(end, client);
        }
        self.tap(end);
        for (client, event) in self.feed.drain_all() {
            self.deliver(end, client, event);
        }

        let refetched = self.config.fault.write_failure_percent > 0;
        if refetched {
            for client in &mut self.clients {
                client.refetch().context("refetch after drift")?;
                self.trace.push(TraceEvent {
                    round: end,
                    kind: TraceEventKind::Refetch { client: client.id() },
                });
            }
        }

        let truth = self.storage.to_store().context("read storage truth")?;
        let oracle = ConvergenceOracle::check_all(&truth, self.clients.iter().map(|c| (c.id(), c.store())));
        let entity_count = oracle::Snapshot::of(&truth).entity_count();

        info!(
            seed = self.config.seed,
            passed = oracle.passed,
            violations = oracle.violations.len(),
            entities = entity_count,
            "simulation finished"
        );

        Ok(SimulationResult {
            seed: self.config.seed,
            trace: self.trace.clone(),
            stats: self.stats,
            refetched,
            oracle,
            entity_count,
            interesting_state_reached: self.stats.parked_peak > 0 || self.stats.reordered_rounds > 0,
        })
    }

    fn step(&mut self, round: u64) {
        for client in 0..self.clients.len() {
            for _ in 0..self.config.actions_per_round {
                let (action, outcome) = self.clients[client].act(&mut self.rng);
                match outcome {
                    ActionOutcome::Applied => self.stats.actions_applied += 1,
                    ActionOutcome::Rejected { .. } => self.stats.actions_rejected += 1,
                    ActionOutcome::Skipped => {}
                }
                self.trace.push(TraceEvent {
                    round,
                    kind: TraceEventKind::Act {
                        client,
                        action,
                        outcome,
                    },
                });
            }
            if self.rng.hit_rate_percent(self.config.flush_percent) {
                if self.rng.hit_rate_percent(self.config.fault.write_failure_percent) {
                    self.storage.fail_next_writes(1);
                }
                self.flush(round, client);
            }
        }

        self.tap(round);
        let outcome = self.feed.deliver_ready(round, &mut self.rng);
        if outcome.reordered {
            self.stats.reordered_rounds += 1;
            self.trace.push(TraceEvent {
                round,
                kind: TraceEventKind::Reorder {
                    events: outcome.delivered.len(),
                },
            });
        }
        for (client, event) in outcome.delivered {
            self.deliver(round, client, event);
        }
    }

    fn flush(&mut self, round: u64, client: ClientId) {
        let report = self.clients[client].flush();
        if report.batches == 0 {
            return;
        }
        self.stats.writes += report.writes;
        self.stats.write_failures += report.failures;
        self.trace.push(TraceEvent {
            round,
            kind: TraceEventKind::Flush {
                client,
                writes: report.writes,
                failures: report.failures,
            },
        });
    }

    /// Move everything storage emitted into the simulated feed, one copy
    /// per client.
    fn tap(&mut self, round: u64) {
        let events: Vec<_> = self.taps.iter().flat_map(Subscription::drain).collect();
        for event in events {
            for client in 0..self.clients.len() {
                let sent = self.feed.send(client, event.clone(), round, &mut self.rng);
                if sent.duplicated {
                    self.stats.duplicated += 1;
                }
            }
        }
    }

    fn deliver(&mut self, round: u64, client: ClientId, event: lanes_core::realtime::ChangeEvent) {
        let table = event.table;
        let change = event.kind;
        let outcome = self.clients[client].deliver(event);
        self.stats.delivered += 1;
        if outcome.is_none() {
            self.stats.malformed += 1;
        }
        self.stats.parked_peak = self.stats.parked_peak.max(self.clients[client].parked());
        debug!(round, client, %table, %change, ?outcome, "delivered");
        self.trace.push(TraceEvent {
            round,
            kind: TraceEventKind::Deliver {
                client,
                table,
                change,
                applied: outcome.is_some_and(MergeOutcome::is_applied),
            },
        });
    }
}

fn seed_board(storage: &MemoryStorage) -> Result<()> {
    let project = Project {
        id: PROJECT_ID.to_string(),
        name: "Simulation".to_string(),
        description: None,
        created_at: None,
        updated_at: None,
    };
    storage
        .insert(Table::Projects, project.to_row())
        .context("seed project")?;
    for (position, title) in ["Todo", "Doing", "Done"].into_iter().enumerate() {
        let mut column = Column::new(Some(PROJECT_ID.to_string()), title);
        column.id = format!("col-{}", title.to_lowercase());
        column.order_position = Some(i64::try_from(position)?);
        storage
            .insert(Table::Columns, column.to_row())
            .context("seed column")?;
    }
    Ok(())
}
