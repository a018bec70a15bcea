//! `lanes show` — render a board snapshot in display order.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use lanes_core::BoardStore;
use lanes_core::graph::{DependencyGate, DependencyGraph, find_all_cycles};
use lanes_core::model::{DeliverableStatus, Priority};
use lanes_core::realtime::merge::sort_by_order_position;
use serde::Serialize;

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Board snapshot (JSON).
    #[arg(value_name = "SNAPSHOT")]
    pub snapshot: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct BoardView {
    pub project: Option<String>,
    pub columns: Vec<ColumnView>,
    /// Tasks whose column is not on the board.
    pub orphaned_tasks: Vec<String>,
    pub cycles: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ColumnView {
    pub id: String,
    pub title: String,
    pub tasks: Vec<TaskView>,
}

#[derive(Debug, Serialize)]
pub struct TaskView {
    pub id: String,
    pub title: String,
    pub priority: Priority,
    pub deliverables: Vec<DeliverableView>,
}

#[derive(Debug, Serialize)]
pub struct DeliverableView {
    pub id: String,
    pub title: String,
    pub status: DeliverableStatus,
    /// `None` when editable; otherwise the deliverable it waits on.
    pub blocked_on: Option<String>,
}

impl BoardView {
    pub fn of(store: &BoardStore) -> Self {
        let graph = DependencyGraph::from_store(store);
        let columns = store
            .columns()
            .iter()
            .map(|column| ColumnView {
                id: column.id.clone(),
                title: column.title.clone(),
                tasks: store
                    .tasks_in_column(&column.id)
                    .map(|task| TaskView {
                        id: task.id.clone(),
                        title: task.title.clone(),
                        priority: task.priority,
                        deliverables: task
                            .deliverables
                            .iter()
                            .map(|d| DeliverableView {
                                id: d.id.clone(),
                                title: d.title.clone(),
                                status: d.status,
                                blocked_on: match graph.gate(&d.id) {
                                    DependencyGate::Open => None,
                                    DependencyGate::Blocked { depends_on, .. } => Some(depends_on),
                                },
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        Self {
            project: store.project().map(|p| p.name.clone()),
            columns,
            orphaned_tasks: store.orphaned_tasks().iter().map(|t| t.id.clone()).collect(),
            cycles: find_all_cycles(&graph).iter().map(ToString::to_string).collect(),
        }
    }

    fn task_count(&self) -> usize {
        self.columns.iter().map(|c| c.tasks.len()).sum()
    }
}

fn render_text(view: &BoardView, w: &mut dyn Write) -> io::Result<()> {
    for column in &view.columns {
        for (position, task) in column.tasks.iter().enumerate() {
            writeln!(
                w,
                "column={} pos={} task={} priority={} deliverables={} title={:?}",
                column.title,
                position + 1,
                task.id,
                task.priority,
                task.deliverables.len(),
                task.title
            )?;
        }
    }
    for id in &view.orphaned_tasks {
        writeln!(w, "orphan task={id}")?;
    }
    for cycle in &view.cycles {
        writeln!(w, "cycle {cycle}")?;
    }
    Ok(())
}

fn render_pretty(view: &BoardView, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, view.project.as_deref().unwrap_or("(no project)"))?;
    pretty_kv(w, "Columns", view.columns.len().to_string())?;
    pretty_kv(w, "Tasks", view.task_count().to_string())?;
    for column in &view.columns {
        writeln!(w)?;
        pretty_section(w, &format!("{} ({})", column.title, column.tasks.len()))?;
        for task in &column.tasks {
            writeln!(w, "[{:<6}] {}", task.priority.as_str(), task.title)?;
            for d in &task.deliverables {
                match &d.blocked_on {
                    Some(on) => writeln!(w, "    - {} ({}, blocked on {on})", d.title, d.status)?,
                    None => writeln!(w, "    - {} ({})", d.title, d.status)?,
                }
            }
        }
    }
    if !view.orphaned_tasks.is_empty() {
        writeln!(w)?;
        pretty_kv(w, "Orphans", view.orphaned_tasks.join(", "))?;
    }
    if !view.cycles.is_empty() {
        writeln!(w)?;
        pretty_section(w, "Dependency Cycles")?;
        for cycle in &view.cycles {
            writeln!(w, "- {cycle}")?;
        }
    }
    Ok(())
}

/// Print `store` in the requested mode.
pub fn print_board(store: &BoardStore, output: OutputMode) -> Result<()> {
    let view = BoardView::of(store);
    render_mode(output, &view, render_text, render_pretty)
}

/// Execute `lanes show`.
pub fn run_show(args: &ShowArgs, output: OutputMode, _project_root: &Path) -> Result<()> {
    let mut store = super::load_snapshot(&args.snapshot)?;
    store.update_columns(sort_by_order_position);
    print_board(&store, output)
}
