#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use output::OutputMode;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "cadence: team project tracker with auditable state machines",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Project root (defaults to the current directory).
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }

    fn root(&self) -> PathBuf {
        self.root
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Initialize a cadence workspace",
        long_about = "Create the .cadence directory, config file, and database in the current directory.",
        after_help = "EXAMPLES:\n    # Initialize a workspace\n    cad init\n\n    # Emit machine-readable output\n    cad init --json"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        about = "Serve the MCP tool surface over stdio",
        long_about = "Run the JSON-RPC (MCP) server over stdin/stdout until EOF.",
        after_help = "EXAMPLES:\n    # Serve for an MCP client\n    cad serve"
    )]
    Serve(cmd::serve::ServeArgs),

    #[command(
        about = "Flow analytics from the transition log",
        long_about = "Per-state durations, per-user durations, and per-user cycle times derived from task transitions.",
        after_help = "EXAMPLES:\n    # State durations across all tasks\n    cad flow\n\n    # Cycle times for one project\n    cad flow --project 3 --cycle"
    )]
    Flow(cmd::flow::FlowArgs),

    #[command(
        about = "List audit-trail changes",
        long_about = "List changes from the audit log, personally or scoped to a team.",
        after_help = "EXAMPLES:\n    # My changes in the last day\n    cad changes --user 1\n\n    # A team's changes in a window\n    cad changes --user 1 --team 2 --start 2025-11-03T00:00:00Z"
    )]
    Changes(cmd::changes::ChangesArgs),

    #[command(
        about = "Apply a state transition",
        long_about = "Transition a task's workflow state or a project's risk state through the state machine.",
        after_help = "EXAMPLES:\n    # Start work on a task\n    cad transition --user 1 --task 4 --state in_progress\n\n    # Flag a project at risk\n    cad transition --user 1 --project 2 --state red"
    )]
    Transition(cmd::transition::TransitionArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mode = cli.output_mode();
    let root = cli.root();

    match &cli.command {
        Commands::Init(args) => cmd::init::run(args, mode, &root),
        Commands::Serve(args) => cmd::serve::run(args, &root),
        Commands::Flow(args) => cmd::flow::run(args, mode, &root),
        Commands::Changes(args) => cmd::changes::run(args, mode, &root),
        Commands::Transition(args) => cmd::transition::run(args, mode, &root),
    }
}
