//! `lanes tool` — apply an assistant tool call to a snapshot, or list the
//! tools the board offers.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use lanes_core::gateway::FlushReport;
use lanes_core::tools::{ToolCall, tool_definitions};
use serde::Serialize;

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ToolArgs {
    /// Board snapshot (JSON).
    #[arg(value_name = "SNAPSHOT", required_unless_present = "list")]
    pub snapshot: Option<PathBuf>,

    /// Tool call file: `{"name": ..., "arguments": {...}}`.
    #[arg(long, value_name = "PATH", required_unless_present = "list")]
    pub call: Option<PathBuf>,

    /// Print the tool definitions offered to the assistant.
    #[arg(long, conflicts_with_all = ["snapshot", "call"])]
    pub list: bool,

    /// Write the resulting board snapshot here.
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ToolOutput {
    tool: String,
    /// Ids created by the call, in argument order.
    created: Vec<String>,
    flush: FlushReport,
    notifications: Vec<String>,
}

fn render_text(out: &ToolOutput, w: &mut dyn Write) -> io::Result<()> {
    writeln!(
        w,
        "tool={} created={} writes={} failures={}",
        out.tool,
        out.created.len(),
        out.flush.writes,
        out.flush.failures
    )?;
    for id in &out.created {
        writeln!(w, "created id={id}")?;
    }
    for note in &out.notifications {
        writeln!(w, "notification {note}")?;
    }
    Ok(())
}

fn render_pretty(out: &ToolOutput, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("Tool {}", out.tool))?;
    pretty_kv(w, "Created", out.created.len().to_string())?;
    pretty_kv(w, "Writes", out.flush.writes.to_string())?;
    pretty_kv(w, "Failures", out.flush.failures.to_string())?;
    for note in &out.notifications {
        writeln!(w, "! {note}")?;
    }
    Ok(())
}

fn list_tools(output: OutputMode) -> Result<()> {
    let tools = tool_definitions();
    render_mode(
        output,
        &tools,
        |tools, w| {
            for tool in tools {
                writeln!(w, "tool={} description={:?}", tool.name, tool.description)?;
            }
            Ok(())
        },
        |tools, w| {
            pretty_section(w, "Tools")?;
            for tool in tools {
                pretty_kv(w, tool.name, tool.description)?;
            }
            Ok(())
        },
    )
}

fn load_call(path: &Path) -> Result<ToolCall> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read tool call {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse tool call {}", path.display()))
}

/// Execute `lanes tool`.
pub fn run_tool(args: &ToolArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    if args.list {
        return list_tools(output);
    }
    let (Some(snapshot), Some(call)) = (&args.snapshot, &args.call) else {
        anyhow::bail!("a snapshot and --call are required");
    };

    let store = super::load_snapshot(snapshot)?;
    let call = load_call(call)?;
    let mut board = super::open_offline(&store, project_root)?;

    let created = board.call_tool(&call)?.into_iter().flatten().collect();
    let flush = board.flush();
    let notifications = board.take_notifications().iter().map(ToString::to_string).collect();

    if let Some(path) = &args.out {
        super::write_snapshot(path, board.store())?;
    }

    let out = ToolOutput {
        tool: call.name,
        created,
        flush,
        notifications,
    };
    render_mode(output, &out, render_text, render_pretty)
}
