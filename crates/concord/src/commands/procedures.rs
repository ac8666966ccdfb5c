//! Procedure commands - register workflows, match contexts, record outcomes.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use serde_json::{Value, json};

use concord_store::{Id, MemoryDomain, MemoryType, RecallOptions};

use super::{Context, print_json};

/// Arguments for the workflow command.
#[derive(Args, Debug)]
pub struct WorkflowArgs {
    /// Agent registering the workflow
    pub agent: String,

    /// Workflow name (unique per agent)
    pub name: String,

    /// When the workflow applies
    pub trigger: String,

    /// What the workflow does
    #[arg(long, default_value = "")]
    pub description: String,

    /// Action step, in order (repeatable)
    #[arg(short, long = "step")]
    pub steps: Vec<String>,

    /// Domain tag (defaults to the agent's registered domain)
    #[arg(short, long)]
    pub domain: Option<MemoryDomain>,
}

/// Arguments for the match command.
#[derive(Args, Debug)]
pub struct MatchArgs {
    /// Agent the match runs for
    pub agent: String,

    /// Situation to match procedures against
    pub context: String,

    /// Maximum procedures to return
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Only procedures tagged with this domain
    #[arg(short, long)]
    pub domain: Option<MemoryDomain>,
}

/// Arguments for the feedback command.
#[derive(Args, Debug)]
pub struct FeedbackArgs {
    /// Agent reporting the outcome
    pub agent: String,

    /// Procedure id
    pub id: Id,

    /// The procedure did not work
    #[arg(long)]
    pub failure: bool,
}

/// Run the workflow command.
pub async fn run_workflow(args: WorkflowArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let steps = args.steps.into_iter().map(Value::String).collect();
    let id = store
        .add_workflow(
            &args.agent,
            &args.name,
            &args.description,
            &args.trigger,
            steps,
            args.domain,
        )
        .await?;

    if ctx.json_output {
        return print_json(&json!({ "memory": "procedural", "id": id.to_string() }));
    }
    println!(
        "{} workflow {} {}",
        Style::new().green().apply_to("Stored"),
        args.name,
        style(id).cyan()
    );
    Ok(())
}

/// Run the match command.
pub async fn run_match(args: MatchArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let dim = Style::new().dim();

    let mut options = RecallOptions::new().types([MemoryType::Procedural]);
    if let Some(limit) = args.limit {
        options = options.limit(limit);
    }
    if let Some(domain) = args.domain {
        options = options.in_domain(domain);
    }
    let matches = store.recall(&args.context, &args.agent, &options).await.procedural;

    if ctx.json_output {
        return print_json(&matches);
    }
    if matches.is_empty() {
        println!("{}", dim.apply_to("No matching procedures"));
        return Ok(());
    }

    println!("{}", style("Matching Procedures").bold());
    println!("{}", dim.apply_to("─".repeat(50)));
    println!();
    for (i, m) in matches.iter().enumerate() {
        let p = &m.procedure;
        println!(
            "{}. {} {}",
            style(i + 1).cyan(),
            style(&p.name).bold(),
            dim.apply_to(format!("({})", p.kind.as_str()))
        );
        println!(
            "   {}",
            dim.apply_to(format!(
                "score {:.3} · confidence {:.2} · {} ok / {} failed",
                m.score, p.confidence, p.success_count, p.failure_count
            ))
        );
        if !m.matched_keywords.is_empty() {
            println!(
                "   {}",
                dim.apply_to(format!("keywords: {}", m.matched_keywords.join(", ")))
            );
        }
        if ctx.verbose {
            println!("   {}", dim.apply_to(p.id));
        }
        println!();
    }
    Ok(())
}

/// Run the feedback command.
pub async fn run_feedback(args: FeedbackArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let updated = store
        .record_procedure_outcome(&args.agent, args.id, !args.failure)
        .await?;

    if ctx.json_output {
        return print_json(&updated);
    }
    println!(
        "{} {} confidence {:.2} ({} ok / {} failed)",
        Style::new().green().apply_to("Updated"),
        updated.name,
        updated.confidence,
        updated.success_count,
        updated.failure_count
    );
    Ok(())
}
