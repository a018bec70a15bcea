//! `lanes priority` — map a slider offset to a priority.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use lanes_core::model::Priority;
use lanes_core::priority::priority_from_offset;
use serde::Serialize;

use crate::output::{OutputMode, pretty_kv, render_mode};

#[derive(Args, Debug)]
pub struct PriorityArgs {
    /// Pointer offset from the left edge of the track.
    #[arg(allow_negative_numbers = true)]
    pub offset: f64,

    /// Track width.
    pub width: f64,
}

#[derive(Debug, Serialize)]
struct PriorityOutput {
    offset: f64,
    width: f64,
    priority: Priority,
    /// Where the thumb settles for that priority, as a fraction of the track.
    thumb: f64,
}

/// Execute `lanes priority`.
pub fn run_priority(args: &PriorityArgs, output: OutputMode, _project_root: &Path) -> Result<()> {
    let priority = priority_from_offset(args.offset, args.width);
    let out = PriorityOutput {
        offset: args.offset,
        width: args.width,
        priority,
        thumb: priority.slider_ratio(),
    };
    render_mode(
        output,
        &out,
        |out, w| writeln!(w, "priority={} thumb={}", out.priority, out.thumb),
        |out, w| {
            pretty_kv(w, "Priority", out.priority.as_str())?;
            pretty_kv(w, "Thumb", format!("{:.1}%", out.thumb * 100.0))
        },
    )
}
