//! Concord - shared memory store for cooperating agents
//!
//! Main entry point for the Concord CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{agents, maintain, memory, procedures};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Concord - shared memory store for cooperating agents
#[derive(Parser)]
#[command(name = "concord")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file layered over the discovered ones
    #[arg(short, long, global = true, env = "CONCORD_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite database file (overrides `store.database`)
    #[arg(long, global = true, env = "CONCORD_DATABASE")]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List registered agents
    Agents(agents::AgentsArgs),

    /// Record an interaction in episodic memory
    Remember(memory::RememberArgs),

    /// Record a fact or preference in semantic memory
    Learn(memory::LearnArgs),

    /// Search memory on behalf of an agent
    Recall(memory::RecallArgs),

    /// Register a workflow
    Workflow(procedures::WorkflowArgs),

    /// Find procedures matching a context
    Match(procedures::MatchArgs),

    /// Report a procedure outcome
    Feedback(procedures::FeedbackArgs),

    /// Purge expired working memory and decay old episodes
    Maintain,

    /// Show store statistics
    Stats,
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable, stderr) + rotating JSON file
    let filter = if cli.verbose {
        "concord=debug,concord_store=debug,concord_memory=debug,concord_session=debug,concord_embed=debug,concord_config=debug,info"
    } else {
        "concord=info,concord_store=info,concord_memory=info,warn"
    };

    let log_dir = concord_config::xdg_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "concord.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "concord=trace,concord_store=trace,concord_memory=trace,concord_session=trace,concord_embed=trace,concord_config=trace,info",
                )),
        )
        .init();

    let loaded = concord_config::load_config(cli.config.as_deref())?;
    for warning in &loaded.warnings {
        tracing::warn!("{warning}");
    }

    let ctx = commands::Context {
        config: loaded.config,
        database: cli.database,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Agents(args) => agents::run(args, &ctx).await,
        Commands::Remember(args) => memory::run_remember(args, &ctx).await,
        Commands::Learn(args) => memory::run_learn(args, &ctx).await,
        Commands::Recall(args) => memory::run_recall(args, &ctx).await,
        Commands::Workflow(args) => procedures::run_workflow(args, &ctx).await,
        Commands::Match(args) => procedures::run_match(args, &ctx).await,
        Commands::Feedback(args) => procedures::run_feedback(args, &ctx).await,
        Commands::Maintain => maintain::run_maintain(&ctx).await,
        Commands::Stats => maintain::run_stats(&ctx).await,
    }
}
