//! `lanes drag` — run one drag gesture against a snapshot and print what a
//! screen reader would hear.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::Args;
use lanes_core::drag::DragItem;
use lanes_core::gateway::FlushReport;
use serde::Serialize;

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct DragArgs {
    /// Board snapshot (JSON).
    #[arg(value_name = "SNAPSHOT")]
    pub snapshot: PathBuf,

    /// Item to pick up: `task:<id>` or `column:<id>`.
    #[arg(long, value_name = "ITEM", value_parser = parse_item)]
    pub item: DragItem,

    /// Items to drag over, in order. The last one is the drop target.
    #[arg(long, value_name = "ITEM", value_parser = parse_item, required = true)]
    pub over: Vec<DragItem>,

    /// Cancel instead of dropping.
    #[arg(long)]
    pub cancel: bool,

    /// Write the resulting board snapshot here.
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,
}

fn parse_item(raw: &str) -> Result<DragItem, String> {
    match raw.split_once(':') {
        Some(("task", id)) if !id.is_empty() => Ok(DragItem::Task(id.to_string())),
        Some(("column", id)) if !id.is_empty() => Ok(DragItem::Column(id.to_string())),
        _ => Err(format!("expected task:<id> or column:<id>, got {raw:?}")),
    }
}

#[derive(Debug, Serialize)]
struct DragOutput {
    announcements: Vec<String>,
    cancelled: bool,
    flush: FlushReport,
}

fn render_text(out: &DragOutput, w: &mut dyn Write) -> io::Result<()> {
    for line in &out.announcements {
        writeln!(w, "announce {line:?}")?;
    }
    writeln!(w, "drag cancelled={} writes={} failures={}", out.cancelled, out.flush.writes, out.flush.failures)
}

fn render_pretty(out: &DragOutput, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, "Drag")?;
    for line in &out.announcements {
        writeln!(w, "> {line}")?;
    }
    writeln!(w)?;
    pretty_kv(w, "Outcome", if out.cancelled { "cancelled" } else { "dropped" })?;
    pretty_kv(w, "Writes", out.flush.writes.to_string())
}

/// Execute `lanes drag`.
pub fn run_drag(args: &DragArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let Some(target) = args.over.last() else {
        bail!("at least one --over target is required");
    };
    let store = super::load_snapshot(&args.snapshot)?;
    let mut board = super::open_offline(&store, project_root)?;

    let mut announcements = vec![board.pick_up(args.item.clone())?];
    if args.item.is_task() {
        for (tick, over) in (1_u64..).zip(&args.over) {
            announcements.extend(board.drag_over(over.clone(), tick)?);
        }
    }
    announcements.push(if args.cancel {
        board.cancel_drag()?
    } else {
        board.drop_on(Some(target.clone()))?
    });
    let flush = board.flush();

    if let Some(path) = &args.out {
        super::write_snapshot(path, board.store())?;
    }

    let out = DragOutput {
        announcements,
        cancelled: args.cancel,
        flush,
    };
    render_mode(output, &out, render_text, render_pretty)
}
