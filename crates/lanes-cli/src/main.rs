#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use lanes_core::config::resolve_config;
use output::OutputMode;
use std::env;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "lanes: kanban board reconciliation engine",
    long_about = None
)]
struct Cli {
    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Output format. Overrides `--json`, `FORMAT` and the user config.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Board",
        about = "Render a board snapshot",
        long_about = "Render a board snapshot: columns in order, their tasks, each deliverable's\n\
                      status and whether its dependency blocks it.",
        after_help = "EXAMPLES:\n    # Show a board\n    lanes show board.json\n\n    # Emit machine-readable output\n    lanes show board.json --json"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Board",
        about = "Replay change-feed events onto a snapshot",
        long_about = "Apply recorded realtime events to a snapshot in order, the way an open\n\
                      board would, and report what each one did.",
        after_help = "EXAMPLES:\n    # Replay events and report\n    lanes feed board.json events.json\n\n    # Keep the merged board\n    lanes feed board.json events.json --out merged.json"
    )]
    Feed(cmd::feed::FeedArgs),

    #[command(
        next_help_heading = "Board",
        about = "Apply an assistant tool call to a snapshot",
        long_about = "Resolve an assistant tool call into board mutations, apply them\n\
                      optimistically and write them through to storage.",
        after_help = "EXAMPLES:\n    # List the tools\n    lanes tool --list\n\n    # Apply a call and keep the result\n    lanes tool board.json --call add.json --out board.json"
    )]
    Tool(cmd::tool::ToolArgs),

    #[command(
        next_help_heading = "Board",
        about = "Run one drag gesture against a snapshot",
        long_about = "Pick up a task or column, drag it over targets and drop or cancel,\n\
                      printing each live-region announcement.",
        after_help = "EXAMPLES:\n    # Drag a task onto another column\n    lanes drag board.json --item task:t1 --over column:doing\n\n    # Reorder columns\n    lanes drag board.json --item column:done --over column:todo"
    )]
    Drag(cmd::drag::DragArgs),

    #[command(
        next_help_heading = "Board",
        about = "Map a slider offset to a priority",
        after_help = "EXAMPLES:\n    # Three quarters along a 200px track\n    lanes priority 150 200"
    )]
    Priority(cmd::priority::PriorityArgs),

    #[command(
        next_help_heading = "Development",
        about = "Deterministic convergence simulation",
        after_help = "EXAMPLES:\n    # Run a campaign\n    lanes sim run --seeds 100\n\n    # Replay one seed\n    lanes sim replay --seed 7"
    )]
    Sim(cmd::sim::SimArgs),

    #[command(
        next_help_heading = "Project Maintenance",
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    lanes completions bash\n\n    # Generate zsh completions\n    lanes completions zsh"
    )]
    Completions {
        /// Target shell for completion script generation.
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("LANES_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "lanes=debug,info"
        } else {
            "lanes=info,warn"
        })
    });

    let format = env::var("LANES_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    // Logs go to stderr; stdout carries command output.
    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let project_root = env::current_dir()?;
    let output = match cli.format {
        Some(mode) => mode,
        None => OutputMode::from_name(&resolve_config(&project_root, cli.json)?.resolved_output),
    };
    debug!(?output, root = %project_root.display(), "resolved output mode");

    match cli.command {
        Commands::Show(ref args) => cmd::show::run_show(args, output, &project_root),
        Commands::Feed(ref args) => cmd::feed::run_feed(args, output, &project_root),
        Commands::Tool(ref args) => cmd::tool::run_tool(args, output, &project_root),
        Commands::Drag(ref args) => cmd::drag::run_drag(args, output, &project_root),
        Commands::Priority(ref args) => cmd::priority::run_priority(args, output, &project_root),
        Commands::Sim(ref args) => cmd::sim::run_sim(args, output, &project_root),
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "lanes", &mut std::io::stdout());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_parses_after_subcommand() {
        let cli = Cli::parse_from(["lanes", "show", "board.json", "--json"]);
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Show(_)));
    }

    #[test]
    fn format_flag_overrides() {
        let cli = Cli::parse_from(["lanes", "--format", "text", "priority", "1", "4"]);
        assert_eq!(cli.format, Some(OutputMode::Text));
    }

    #[test]
    fn negative_offsets_parse() {
        let cli = Cli::parse_from(["lanes", "priority", "-5", "100"]);
        let Commands::Priority(args) = cli.command else {
            panic!("expected priority");
        };
        assert!(args.offset < 0.0);
    }

    #[test]
    fn tool_list_needs_no_snapshot() {
        let cli = Cli::parse_from(["lanes", "tool", "--list"]);
        let Commands::Tool(args) = cli.command else {
            panic!("expected tool");
        };
        assert!(args.list);
        assert!(args.snapshot.is_none());
    }

    #[test]
    fn sim_params_flatten() {
        let cli = Cli::parse_from(["lanes", "sim", "run", "--seeds", "3", "--clients", "2"]);
        let Commands::Sim(args) = cli.command else {
            panic!("expected sim");
        };
        let cmd::sim::SimCommand::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.seeds, 3);
        assert_eq!(run.params.clients, 2);
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
