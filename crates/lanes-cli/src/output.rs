//! Output modes shared by every `lanes` command.
//!
//! Each command builds one serializable report and hands it to
//! [`render_mode`] with a text renderer (`key=value` lines for pipes) and a
//! pretty renderer (headed sections for terminals). JSON needs no renderer.
//!
//! The mode comes from `--format`, then `--json`, then the `FORMAT`
//! variable, then the user config, and finally from whether stdout is a
//! terminal.

use clap::ValueEnum;
use serde::Serialize;
use std::io::{self, Write};

const RULE_WIDTH: usize = 72;
const KEY_WIDTH: usize = 12;

/// Heading line plus a dashed rule.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    writeln!(w, "{}", "-".repeat(RULE_WIDTH))
}

/// `Key:` padded to a fixed column, then the value.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    let key = format!("{key}:");
    writeln!(w, "{key:<KEY_WIDTH$} {}", value.as_ref())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Sections and aligned fields for a terminal.
    Pretty,
    /// `key=value` lines for scripts.
    Text,
    /// One pretty-printed JSON document.
    Json,
}

impl OutputMode {
    /// Map a name from [`lanes_core::config::resolve_output`]; anything
    /// unrecognised is text.
    pub fn from_name(name: &str) -> Self {
        <Self as ValueEnum>::from_str(name, true).unwrap_or(Self::Text)
    }
}

pub fn render_mode<T: Serialize>(
    mode: OutputMode,
    report: &T,
    text: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
    pretty: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut stdout, report)?;
            writeln!(stdout)?;
        }
        OutputMode::Text => text(report, &mut stdout)?,
        OutputMode::Pretty => pretty(report, &mut stdout)?,
    }
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_names_map_to_modes() {
        assert_eq!(OutputMode::from_name("pretty"), OutputMode::Pretty);
        assert_eq!(OutputMode::from_name("JSON"), OutputMode::Json);
        assert_eq!(OutputMode::from_name("table"), OutputMode::Text);
    }

    #[test]
    fn kv_keys_share_a_column() {
        let mut buf = Vec::new();
        pretty_kv(&mut buf, "Seeds", "10").expect("write");
        pretty_kv(&mut buf, "Parked peak", "2").expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        assert_eq!(text, "Seeds:       10\nParked peak: 2\n");
    }

    #[test]
    fn section_is_heading_then_rule() {
        let mut buf = Vec::new();
        pretty_section(&mut buf, "Board").expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Board"));
        assert_eq!(lines.next().map(str::len), Some(RULE_WIDTH));
    }
}
