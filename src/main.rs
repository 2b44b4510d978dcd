mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mnemo::config::MnemoConfig;
use mnemo::server;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mnemo", version, about = "Multi-agent session memory for AI coding assistants")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server on stdio, or the HTTP API with --http
    Serve {
        #[arg(long)]
        http: bool,
    },
    /// Manage agents and their API keys
    Agent {
        #[command(subcommand)]
        action: cli::agent::AgentAction,
    },
    /// Manage project aliases
    Alias {
        #[command(subcommand)]
        action: cli::alias::AliasAction,
    },
    /// Search observations, summaries or prompts
    Search(cli::search::SearchArgs),
    /// Find records that touched a file or folder
    Files(cli::files::FilesArgs),
    /// Show record statistics
    Stats {
        /// Limit counts to one project (and its aliases)
        #[arg(long)]
        project: Option<String>,
    },
    /// Check database health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level)
    let config = MnemoConfig::load()?;

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { http: false } => server::serve_stdio(config).await?,
        Command::Serve { http: true } => server::serve_http(config).await?,
        Command::Agent { action } => cli::agent::run(&config, action)?,
        Command::Alias { action } => cli::alias::run(&config, action)?,
        Command::Search(args) => cli::search::search(&config, args)?,
        Command::Files(args) => cli::files::files(&config, args)?,
        Command::Stats { project } => cli::stats::stats(&config, project.as_deref())?,
        Command::Doctor => cli::doctor::doctor(&config)?,
    }

    Ok(())
}
