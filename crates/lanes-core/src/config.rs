use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::Path;

use crate::gateway::GatewayOptions;
use crate::model::Table;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanesConfig {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub dependencies: DependencyConfig,
    #[serde(default)]
    pub drag: DragConfig,
}

impl LanesConfig {
    #[must_use]
    pub const fn gateway_options(&self) -> GatewayOptions {
        GatewayOptions {
            reject_cycles: self.dependencies.reject_cycles,
            max_dependency_depth: self.dependencies.max_depth,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Subscribe to the change feed when a board opens.
    #[serde(default = "default_true")]
    pub realtime: bool,
    #[serde(default = "default_tables")]
    pub tables: Vec<Table>,
    /// Deliverable events held back while their task is unknown.
    #[serde(default = "default_max_parked_events")]
    pub max_parked_events: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            realtime: default_true(),
            tables: default_tables(),
            max_parked_events: default_max_parked_events(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyConfig {
    #[serde(default = "default_true")]
    pub reject_cycles: bool,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            reject_cycles: default_true(),
            max_depth: default_max_depth(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DragConfig {
    #[serde(default = "default_true")]
    pub debounce_per_tick: bool,
}

impl Default for DragConfig {
    fn default() -> Self {
        Self {
            debounce_per_tick: default_true(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: LanesConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

pub fn load_project_config(project_root: &Path) -> Result<LanesConfig> {
    let path = project_root.join(".lanes/config.toml");
    if !path.exists() {
        return Ok(LanesConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<LanesConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("lanes/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn resolve_config(project_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;

    let env_format = env::var("FORMAT").ok();
    let resolved_output = resolve_output(cli_json, user.output.as_deref(), env_format.as_deref());

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
    })
}

/// Output mode: `--json` beats `FORMAT`, which beats the user config,
/// which beats TTY detection.
pub fn resolve_output(
    cli_json: bool,
    user_output: Option<&str>,
    env_format: Option<&str>,
) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "table" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = user_output.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if std::io::stdout().is_terminal() {
        "pretty".to_string()
    } else {
        "text".to_string()
    }
}

const fn default_true() -> bool {
    true
}

fn default_tables() -> Vec<Table> {
    Table::ALL.to_vec()
}

const fn default_max_parked_events() -> usize {
    256
}

const fn default_max_depth() -> usize {
    64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project_with_config(toml_text: &str) -> TempDir {
        let dir = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(dir.path().join(".lanes")).expect("create .lanes");
        std::fs::write(dir.path().join(".lanes/config.toml"), toml_text).expect("write config");
        dir
    }

    #[test]
    fn missing_project_config_uses_defaults() {
        let root = TempDir::new().expect("tempdir");
        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert!(cfg.sync.realtime);
        assert_eq!(cfg.sync.tables, Table::ALL.to_vec());
        assert_eq!(cfg.sync.max_parked_events, 256);
        assert!(cfg.dependencies.reject_cycles);
        assert_eq!(cfg.dependencies.max_depth, 64);
        assert!(cfg.drag.debounce_per_tick);
    }

    #[test]
    fn partial_sections_keep_field_defaults() {
        let root = project_with_config(
            r#"
[sync]
tables = ["columns", "tasks"]

[dependencies]
reject_cycles = false
"#,
        );

        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert_eq!(cfg.sync.tables, vec![Table::Columns, Table::Tasks]);
        assert!(cfg.sync.realtime);
        assert!(!cfg.dependencies.reject_cycles);
        assert_eq!(cfg.dependencies.max_depth, 64);

        let options = cfg.gateway_options();
        assert!(!options.reject_cycles);
        assert_eq!(options.max_dependency_depth, 64);
    }

    #[test]
    fn unknown_table_names_fail_to_parse() {
        let root = project_with_config("[sync]\ntables = [\"boards\"]\n");

        let err = load_project_config(root.path()).expect_err("boards is not a table");
        assert!(format!("{err:#}").contains("Failed to parse"));
    }

    #[test]
    fn cli_json_overrides_env_and_config() {
        let output = resolve_output(true, Some("pretty"), Some("text"));
        assert_eq!(output, "json");
    }

    #[test]
    fn env_format_beats_user_config() {
        assert_eq!(resolve_output(false, Some("json"), Some("text")), "text");
    }

    #[test]
    fn legacy_aliases_are_normalized() {
        assert_eq!(resolve_output(false, Some("table"), Some("human")), "pretty");
        assert_eq!(resolve_output(false, Some("human"), Some("table")), "text");
    }

    #[test]
    fn user_config_parses_output() {
        let cfg: UserConfig = toml::from_str("output = \"json\"\n").expect("parse");
        assert_eq!(cfg.output.as_deref(), Some("json"));
    }
}
