//! Maintenance and statistics commands.

use anyhow::Result;
use console::{Style, style};

use super::{Context, print_json};

/// Run a maintenance pass.
pub async fn run_maintain(ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let report = store.maintenance();

    if ctx.json_output {
        return print_json(&report);
    }

    let dim = Style::new().dim();
    println!("{}", style("Maintenance").bold());
    println!("{}", dim.apply_to("─".repeat(50)));
    println!();
    println!("  Expired slots:  {}", style(report.expired_slots).cyan());
    println!("  Decayed:        {}", style(report.decay.updated).cyan());
    println!("  Deleted:        {}", style(report.decay.deleted).cyan());
    println!();
    Ok(())
}

/// Show store statistics.
pub async fn run_stats(ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let stats = store.stats();

    if ctx.json_output {
        return print_json(&stats);
    }

    let dim = Style::new().dim();
    println!("{}", style("Memory Statistics").bold());
    println!("{}", dim.apply_to("─".repeat(50)));
    println!();
    println!("  Agents:      {}", style(stats.agents).cyan());
    println!("  Episodic:    {}", style(stats.episodic).cyan());
    println!("  Semantic:    {}", style(stats.semantic).cyan());
    println!("  Entities:    {}", style(stats.entities).cyan());
    println!("  Procedures:  {}", style(stats.procedures).cyan());
    println!();

    println!("{}", style("Backends").bold());
    println!("{}", dim.apply_to("─".repeat(50)));
    println!();
    println!("  Index:       {}", style(&stats.index).cyan());
    println!("  Embedder:    {}", style(&stats.embedder).cyan());
    if let Some(path) = ctx.database_path() {
        println!("  Database:    {}", dim.apply_to(path.display()));
    }
    println!();
    Ok(())
}
