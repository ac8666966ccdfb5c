//! Agents command - list the registry.

use anyhow::Result;
use clap::Args;
use console::{Style, style};

use concord_store::MemoryDomain;

use super::{Context, print_json};

/// Arguments for the agents command.
#[derive(Args, Debug)]
pub struct AgentsArgs {
    /// Only agents registered in this domain
    #[arg(short, long)]
    pub domain: Option<MemoryDomain>,
}

/// Run the agents command.
pub async fn run(args: AgentsArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let agents = store.list_agents(args.domain);

    if ctx.json_output {
        return print_json(&agents);
    }

    let dim = Style::new().dim();
    println!("{}", style("Registered Agents").bold());
    println!("{}", dim.apply_to("─".repeat(50)));
    println!();
    if agents.is_empty() {
        println!("{}", dim.apply_to("No agents"));
    }
    for agent in &agents {
        println!(
            "  {:<16} {:<10} {}",
            style(&agent.agent_id).cyan(),
            agent.domain.as_str(),
            dim.apply_to(&agent.name)
        );
        if ctx.verbose && !agent.capabilities.is_empty() {
            println!(
                "  {:<16} {}",
                "",
                dim.apply_to(agent.capabilities.join(", "))
            );
        }
    }
    println!();
    Ok(())
}
