//! `lanes feed` — replay recorded change-feed events onto a snapshot.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use lanes_core::realtime::{ChangeEvent, MergeOutcome};
use serde::Serialize;
use tracing::warn;

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct FeedArgs {
    /// Board snapshot (JSON).
    #[arg(value_name = "SNAPSHOT")]
    pub snapshot: PathBuf,

    /// JSON array of change events, in delivery order.
    #[arg(value_name = "EVENTS")]
    pub events: PathBuf,

    /// Write the resulting board snapshot here.
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Default, Serialize)]
struct FeedOutput {
    received: usize,
    appended: usize,
    merged: usize,
    removed: usize,
    ignored: usize,
    malformed: usize,
    /// Deliverable events still waiting on a task at the end.
    parked: usize,
    columns: usize,
    tasks: usize,
}

impl FeedOutput {
    fn tally(&mut self, outcome: Result<MergeOutcome, ()>) {
        match outcome {
            Ok(MergeOutcome::Appended) => self.appended += 1,
            Ok(MergeOutcome::Merged) => self.merged += 1,
            Ok(MergeOutcome::Removed) => self.removed += 1,
            Ok(MergeOutcome::Ignored(_)) => self.ignored += 1,
            Err(()) => self.malformed += 1,
        }
    }
}

fn load_events(path: &Path) -> Result<Vec<ChangeEvent>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read events {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse events {}", path.display()))
}

fn render_text(out: &FeedOutput, w: &mut dyn Write) -> io::Result<()> {
    writeln!(
        w,
        "feed received={} appended={} merged={} removed={} ignored={} malformed={} parked={}",
        out.received, out.appended, out.merged, out.removed, out.ignored, out.malformed, out.parked
    )?;
    writeln!(w, "board columns={} tasks={}", out.columns, out.tasks)
}

fn render_pretty(out: &FeedOutput, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, "Feed Replay")?;
    pretty_kv(w, "Received", out.received.to_string())?;
    pretty_kv(w, "Appended", out.appended.to_string())?;
    pretty_kv(w, "Merged", out.merged.to_string())?;
    pretty_kv(w, "Removed", out.removed.to_string())?;
    pretty_kv(w, "Ignored", out.ignored.to_string())?;
    pretty_kv(w, "Malformed", out.malformed.to_string())?;
    pretty_kv(w, "Parked", out.parked.to_string())?;
    pretty_kv(w, "Board", format!("{} columns, {} tasks", out.columns, out.tasks))
}

/// Execute `lanes feed`.
pub fn run_feed(args: &FeedArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let store = super::load_snapshot(&args.snapshot)?;
    let events = load_events(&args.events)?;
    let mut board = super::open_offline(&store, project_root)?;

    let mut out = FeedOutput {
        received: events.len(),
        ..FeedOutput::default()
    };
    for event in events {
        let outcome = board.apply_change(event).map_err(|err| {
            warn!(%err, "malformed event");
        });
        out.tally(outcome);
    }
    out.parked = board.parked().len();
    out.columns = board.store().columns().len();
    out.tasks = board.store().tasks().len();

    if let Some(path) = &args.out {
        super::write_snapshot(path, board.store())?;
    }
    render_mode(output, &out, render_text, render_pretty)
}
