//! Validate command - check a plan without touching any cluster

use console::style;
use sherwave_core::ReleaseGraph;
use std::path::Path;

use crate::error::Result;

/// Run the validate command
pub fn run(file: &Path) -> Result<()> {
    println!(
        "{} Validating {}",
        style("→").blue(),
        style(file.display()).cyan()
    );

    let plan = super::load_plan(file)?;
    println!(
        "  {} {} release(s), {} repositor(ies), {} monitor(s)",
        style("✓").green(),
        plan.releases.len(),
        plan.repositories.len(),
        plan.monitors.len()
    );

    let graph = ReleaseGraph::from_plan(&plan)?;
    println!(
        "  {} Dependency graph is acyclic ({} node(s))",
        style("✓").green(),
        graph.len()
    );

    println!();
    println!("{} Plan is valid", style("✓").green().bold());
    Ok(())
}
