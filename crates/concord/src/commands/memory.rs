//! Memory commands - remember, learn and recall.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::{Style, style};
use serde_json::json;

use concord_store::{
    MemoryDomain, MemoryRecord, MemoryScope, MemoryType, RecallOptions, RememberOptions,
};

use super::{Context, print_json, truncate};

/// Arguments for the remember command.
#[derive(Args, Debug)]
pub struct RememberArgs {
    /// Agent recording the interaction
    pub agent: String,

    /// What happened
    pub content: String,

    /// Visibility: private, domain or global
    #[arg(short, long, default_value = "private")]
    pub scope: MemoryScope,

    /// Domain tag (defaults to the agent's registered domain)
    #[arg(short, long)]
    pub domain: Option<MemoryDomain>,

    /// Retention weight between 0 and 1
    #[arg(short, long)]
    pub importance: Option<f32>,

    /// Session the interaction belongs to
    #[arg(long)]
    pub session: Option<String>,

    /// Entity reference (repeatable)
    #[arg(short, long = "entity")]
    pub entities: Vec<String>,
}

/// Arguments for the learn command.
#[derive(Args, Debug)]
pub struct LearnArgs {
    #[command(subcommand)]
    pub command: LearnCommand,
}

#[derive(Subcommand, Debug)]
pub enum LearnCommand {
    /// Record a fact
    Fact {
        /// Agent recording the fact
        agent: String,

        /// The fact
        content: String,

        /// Visibility: private, domain or global
        #[arg(short, long, default_value = "private")]
        scope: MemoryScope,

        /// Fact category
        #[arg(short, long)]
        category: Option<String>,

        /// Domain tag (defaults to the agent's registered domain)
        #[arg(short, long)]
        domain: Option<MemoryDomain>,
    },

    /// Record a user preference (visible to every agent)
    Preference {
        /// Agent recording the preference
        agent: String,

        /// The preference
        content: String,

        /// Preference category
        #[arg(short, long)]
        category: String,

        /// Domain tag (defaults to the agent's registered domain)
        #[arg(short, long)]
        domain: Option<MemoryDomain>,
    },
}

/// Arguments for the recall command.
#[derive(Args, Debug)]
pub struct RecallArgs {
    /// Agent the search runs for
    pub agent: String,

    /// Search query
    pub query: String,

    /// Memory type to search (repeatable; default episodic, semantic, procedural)
    #[arg(short = 't', long = "type")]
    pub types: Vec<MemoryType>,

    /// Maximum results per memory type
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Only records tagged with this domain
    #[arg(short, long)]
    pub domain: Option<MemoryDomain>,
}

/// Run the remember command.
pub async fn run_remember(args: RememberArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;

    let mut options = RememberOptions::new()
        .with_scope(args.scope)
        .with_entities(args.entities);
    if let Some(domain) = args.domain {
        options = options.in_domain(domain);
    }
    if let Some(session) = args.session {
        options = options.in_session(session);
    }
    if let Some(importance) = args.importance {
        options = options.with_importance(importance);
    }

    let id = store
        .remember_interaction(&args.agent, &args.content, options)
        .await?;
    report_stored(ctx, "episodic", &id.to_string())
}

/// Run the learn command.
pub async fn run_learn(args: LearnArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let id = match args.command {
        LearnCommand::Fact {
            agent,
            content,
            scope,
            category,
            domain,
        } => {
            store
                .learn_fact(&agent, &content, scope, category.as_deref(), domain)
                .await?
        }
        LearnCommand::Preference {
            agent,
            content,
            category,
            domain,
        } => {
            store
                .learn_preference(&agent, &content, &category, domain)
                .await?
        }
    };
    report_stored(ctx, "semantic", &id.to_string())
}

/// Run the recall command.
pub async fn run_recall(args: RecallArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let dim = Style::new().dim();

    let mut options = RecallOptions::new();
    if !args.types.is_empty() {
        options = options.types(args.types);
    }
    if let Some(limit) = args.limit {
        options = options.limit(limit);
    }
    if let Some(domain) = args.domain {
        options = options.in_domain(domain);
    }

    if ctx.verbose && !ctx.json_output {
        println!(
            "{}",
            dim.apply_to(format!("Recalling \"{}\" as {}", args.query, args.agent))
        );
        println!();
    }

    let recall = store.recall(&args.query, &args.agent, &options).await;
    if ctx.json_output {
        return print_json(&recall);
    }

    if recall.is_empty() {
        if recall.only_hidden() {
            println!(
                "{}",
                dim.apply_to(format!(
                    "No visible results ({} matching records not visible to {})",
                    recall.hidden.unwrap_or_default(),
                    args.agent
                ))
            );
        } else {
            println!("{}", dim.apply_to("No results found"));
        }
        return Ok(());
    }

    print_records("Episodic", &recall.episodic);
    print_records("Semantic", &recall.semantic);
    if !recall.procedural.is_empty() {
        println!("{}", style("Procedural").bold());
        println!("{}", dim.apply_to("─".repeat(50)));
        for (i, m) in recall.procedural.iter().enumerate() {
            println!(
                "{}. {} {}",
                style(i + 1).cyan(),
                m.procedure.name,
                dim.apply_to(format!("(score: {:.3})", m.score))
            );
        }
        println!();
    }
    if let Some(hidden) = recall.hidden.filter(|h| *h > 0) {
        println!(
            "{}",
            dim.apply_to(format!("{hidden} more matching records not visible"))
        );
    }
    Ok(())
}

fn print_records(title: &str, records: &[MemoryRecord]) {
    if records.is_empty() {
        return;
    }
    let dim = Style::new().dim();
    println!("{}", style(title).bold());
    println!("{}", dim.apply_to("─".repeat(50)));
    for (i, record) in records.iter().enumerate() {
        println!("{}. {}", style(i + 1).cyan(), truncate(&record.content, 70));
        println!(
            "   {}",
            dim.apply_to(format!(
                "{} · {} · {} · importance {:.2}",
                record.agent_id, record.domain, record.scope, record.importance
            ))
        );
    }
    println!();
}

fn report_stored(ctx: &Context, memory: &str, id: &str) -> Result<()> {
    if ctx.json_output {
        return print_json(&json!({ "memory": memory, "id": id }));
    }
    println!(
        "{} {} {}",
        Style::new().green().apply_to("Stored"),
        memory,
        style(id).cyan()
    );
    Ok(())
}
