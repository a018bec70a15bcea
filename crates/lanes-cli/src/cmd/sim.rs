//! `lanes sim`: seeded multi-client convergence runs.

use std::io::{self, Write};
use std::path::Path;
use std::process;

use anyhow::Result;
use clap::{Args, Subcommand};
use lanes_sim::campaign::{Campaign, CampaignReport, Replay, SeedFailure, replay_seed, run_campaign};
use lanes_sim::feed::FaultConfig;
use lanes_sim::oracle::InvariantViolation;
use lanes_sim::{SimulationConfig, SimulationStats, TraceEvent};
use serde::Serialize;

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

/// Seeds, and twice as many violations per seed, listed before truncating.
const SAMPLE: usize = 5;

#[derive(Args, Debug)]
pub struct SimArgs {
    #[command(subcommand)]
    pub command: SimCommand,
}

#[derive(Subcommand, Debug)]
pub enum SimCommand {
    #[command(
        about = "Run a range of seeds and check every client converges",
        long_about = "Run several board clients against one shared storage with a delayed,\n\
                      duplicating, reordering change feed. After the final drain every\n\
                      client must match storage. Exits 1 if any seed diverges.",
        after_help = "EXAMPLES:\n    # 100 seeds with default faults\n    lanes sim run --seeds 100\n\n\
                      # More clients, injected write failures\n    lanes sim run --clients 5 --rounds 40 --write-failures 20"
    )]
    Run(SimRunArgs),

    #[command(
        about = "Rerun one seed and show what happened",
        after_help = "EXAMPLES:\n    # Counters and verdict\n    lanes sim replay --seed 42\n\n\
                      # Every trace event\n    lanes sim replay --seed 42 --trace"
    )]
    Replay(SimReplayArgs),
}

/// Simulation knobs shared by `run` and `replay`.
#[derive(Args, Debug, Clone)]
pub struct SimParams {
    #[arg(long, default_value_t = 3)]
    pub clients: usize,

    #[arg(long, default_value_t = 24)]
    pub rounds: u64,

    /// Actions each client takes per round.
    #[arg(long, default_value_t = 2)]
    pub actions: usize,

    /// Percent of deliveries sent twice.
    #[arg(long, default_value_t = 5)]
    pub duplicates: u8,

    /// Percent of rounds whose deliveries are shuffled.
    #[arg(long, default_value_t = 10)]
    pub reorders: u8,

    /// Longest delivery delay, in rounds.
    #[arg(long, default_value_t = 3)]
    pub max_delay: u8,

    /// Percent of flushes that meet an unavailable storage.
    #[arg(long, default_value_t = 0)]
    pub write_failures: u8,
}

impl SimParams {
    fn template(&self) -> SimulationConfig {
        SimulationConfig {
            client_count: self.clients,
            rounds: self.rounds,
            actions_per_round: self.actions,
            fault: FaultConfig {
                max_delay_rounds: self.max_delay,
                duplicate_rate_percent: self.duplicates,
                reorder_rate_percent: self.reorders,
                write_failure_percent: self.write_failures,
            },
            ..SimulationConfig::default()
        }
    }

    fn replay_hint(&self, seed: u64) -> String {
        format!(
            "lanes sim replay --seed {seed} --clients {} --rounds {} --write-failures {}",
            self.clients, self.rounds, self.write_failures
        )
    }
}

#[derive(Args, Debug)]
pub struct SimRunArgs {
    #[arg(long, default_value_t = 100)]
    pub seeds: u64,

    /// First seed of the range.
    #[arg(long, default_value_t = 0)]
    pub seed_start: u64,

    #[command(flatten)]
    pub params: SimParams,
}

#[derive(Args, Debug)]
pub struct SimReplayArgs {
    #[arg(long)]
    pub seed: u64,

    /// Include every trace event.
    #[arg(long)]
    pub trace: bool,

    #[command(flatten)]
    pub params: SimParams,
}

#[derive(Debug, Serialize)]
struct RunReport<'a> {
    seeds_run: usize,
    seeds_passed: usize,
    seeds_failed: usize,
    first_failure: Option<u64>,
    interesting_states_reached: usize,
    all_passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    replay: Option<String>,
    failures: &'a [SeedFailure],
}

impl<'a> RunReport<'a> {
    fn new(report: &'a CampaignReport, params: &SimParams) -> Self {
        Self {
            seeds_run: report.seeds_run,
            seeds_passed: report.seeds_passed(),
            seeds_failed: report.failures.len(),
            first_failure: report.first_failure(),
            interesting_states_reached: report.interesting_states_reached,
            all_passed: report.all_passed(),
            replay: report.first_failure().map(|seed| params.replay_hint(seed)),
            failures: &report.failures,
        }
    }
}

fn run_text(out: &RunReport<'_>, w: &mut dyn Write) -> io::Result<()> {
    writeln!(
        w,
        "campaign seeds_run={} passed={} failed={} interesting_states={} all_passed={}",
        out.seeds_run, out.seeds_passed, out.seeds_failed, out.interesting_states_reached, out.all_passed
    )?;
    for failure in out.failures.iter().take(SAMPLE) {
        writeln!(w, "failure seed={} violations={}", failure.seed, failure.violations.len())?;
    }
    if let Some(hint) = &out.replay {
        writeln!(w, "replay {hint}")?;
    }
    Ok(())
}

fn run_pretty(out: &RunReport<'_>, params: &SimParams, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, "Simulation Campaign")?;
    pretty_kv(w, "Seeds", out.seeds_run.to_string())?;
    pretty_kv(w, "Clients", params.clients.to_string())?;
    pretty_kv(w, "Rounds", params.rounds.to_string())?;
    pretty_kv(
        w,
        "Faults",
        format!(
            "dup {}%, reorder {}%, delay <= {}, write fail {}%",
            params.duplicates, params.reorders, params.max_delay, params.write_failures
        ),
    )?;
    pretty_kv(
        w,
        "Results",
        format!(
            "{} passed, {} failed, {} interesting",
            out.seeds_passed, out.seeds_failed, out.interesting_states_reached
        ),
    )?;
    if out.all_passed {
        return pretty_kv(w, "Status", "all seeds converged");
    }

    writeln!(w)?;
    pretty_section(w, "Diverged Seeds")?;
    for failure in out.failures.iter().take(SAMPLE) {
        writeln!(w, "seed {}", failure.seed)?;
        write_violations(w, &failure.violations)?;
    }
    if out.failures.len() > SAMPLE {
        writeln!(w, "... {} more", out.failures.len() - SAMPLE)?;
    }
    if let Some(hint) = &out.replay {
        writeln!(w)?;
        pretty_kv(w, "Replay", hint)?;
    }
    Ok(())
}

fn write_violations(w: &mut dyn Write, violations: &[InvariantViolation]) -> io::Result<()> {
    let shown = SAMPLE * 2;
    for violation in violations.iter().take(shown) {
        writeln!(w, "  - {violation}")?;
    }
    if violations.len() > shown {
        writeln!(w, "  - ... {} more", violations.len() - shown)?;
    }
    Ok(())
}

/// Execute `lanes sim run`.
pub fn run_sim_run(args: &SimRunArgs, output: OutputMode) -> Result<()> {
    let params = &args.params;
    let seeds = args.seed_start..args.seed_start.saturating_add(args.seeds);
    let report = run_campaign(&Campaign::new(seeds, params.template()))?;

    let out = RunReport::new(&report, params);
    render_mode(output, &out, run_text, |out, w| run_pretty(out, params, w))?;

    if !report.all_passed() {
        process::exit(1);
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct ReplayReport<'a> {
    seed: u64,
    clients: usize,
    rounds: u64,
    oracle_passed: bool,
    refetched: bool,
    entities: usize,
    interesting_state_reached: bool,
    trace_events: usize,
    trace_fingerprint: String,
    stats: SimulationStats,
    violations: &'a [InvariantViolation],
    #[serde(skip_serializing_if = "Option::is_none")]
    trace: Option<&'a [TraceEvent]>,
}

impl<'a> ReplayReport<'a> {
    fn new(replay: &'a Replay, with_trace: bool) -> Self {
        let result = &replay.result;
        Self {
            seed: replay.config.seed,
            clients: replay.config.client_count,
            rounds: replay.config.rounds,
            oracle_passed: replay.passed(),
            refetched: result.refetched,
            entities: result.entity_count,
            interesting_state_reached: result.interesting_state_reached,
            trace_events: result.trace.len(),
            trace_fingerprint: format!("{:016x}", result.trace_fingerprint()),
            stats: result.stats,
            violations: replay.violations(),
            trace: with_trace.then_some(result.trace.as_slice()),
        }
    }
}

fn replay_text(out: &ReplayReport<'_>, w: &mut dyn Write) -> io::Result<()> {
    let s = &out.stats;
    writeln!(
        w,
        "replay seed={} clients={} rounds={} oracle_passed={} refetched={} entities={} fingerprint={}",
        out.seed, out.clients, out.rounds, out.oracle_passed, out.refetched, out.entities, out.trace_fingerprint
    )?;
    writeln!(
        w,
        "stats applied={} rejected={} writes={} write_failures={} delivered={} duplicated={} reordered_rounds={} parked_peak={} malformed={}",
        s.actions_applied,
        s.actions_rejected,
        s.writes,
        s.write_failures,
        s.delivered,
        s.duplicated,
        s.reordered_rounds,
        s.parked_peak,
        s.malformed
    )?;
    for violation in out.violations {
        writeln!(w, "violation {violation}")?;
    }
    for event in out.trace.unwrap_or_default() {
        let line = serde_json::to_string(event).map_err(io::Error::other)?;
        writeln!(w, "trace {line}")?;
    }
    Ok(())
}

fn replay_pretty(out: &ReplayReport<'_>, w: &mut dyn Write) -> io::Result<()> {
    let s = &out.stats;
    pretty_section(w, &format!("Replay Seed {}", out.seed))?;
    pretty_kv(w, "Clients", format!("{} over {} rounds", out.clients, out.rounds))?;
    pretty_kv(w, "Actions", format!("{} applied, {} rejected", s.actions_applied, s.actions_rejected))?;
    pretty_kv(w, "Writes", format!("{} ({} failed)", s.writes, s.write_failures))?;
    pretty_kv(
        w,
        "Delivered",
        format!("{} ({} duplicated, {} shuffled rounds)", s.delivered, s.duplicated, s.reordered_rounds),
    )?;
    pretty_kv(w, "Parked peak", s.parked_peak.to_string())?;
    pretty_kv(w, "Entities", out.entities.to_string())?;
    pretty_kv(w, "Refetched", out.refetched.to_string())?;
    pretty_kv(w, "Fingerprint", &out.trace_fingerprint)?;
    pretty_kv(w, "Converged", out.oracle_passed.to_string())?;

    if !out.violations.is_empty() {
        writeln!(w)?;
        pretty_section(w, "Violations")?;
        write_violations(w, out.violations)?;
    }
    if let Some(trace) = out.trace {
        writeln!(w)?;
        pretty_section(w, "Trace")?;
        for event in trace {
            let line = serde_json::to_string(&event.kind).map_err(io::Error::other)?;
            writeln!(w, "{:>4}  {line}", event.round)?;
        }
    }
    Ok(())
}

/// Execute `lanes sim replay`.
pub fn run_sim_replay(args: &SimReplayArgs, output: OutputMode) -> Result<()> {
    let campaign = Campaign::new(args.seed..args.seed.saturating_add(1), args.params.template());
    let replay = replay_seed(&campaign, args.seed)?;

    let out = ReplayReport::new(&replay, args.trace);
    render_mode(output, &out, replay_text, replay_pretty)?;

    if !replay.passed() {
        process::exit(1);
    }
    Ok(())
}

pub fn run_sim(args: &SimArgs, output: OutputMode, _project_root: &Path) -> Result<()> {
    match &args.command {
        SimCommand::Run(run) => run_sim_run(run, output),
        SimCommand::Replay(replay) => run_sim_replay(replay, output),
    }
}
