//! Graph command - release dependency graph

use console::style;
use sherwave_core::ReleaseGraph;
use std::path::Path;

use crate::error::Result;

/// Run the graph command
pub fn run(file: &Path, order: bool) -> Result<()> {
    let plan = super::load_plan(file)?;
    let graph = ReleaseGraph::from_plan(&plan)?;

    if graph.is_empty() {
        println!("No releases in {}", file.display());
        return Ok(());
    }

    if order {
        for (i, id) in graph.order().iter().enumerate() {
            println!("{:>3}. {}", i + 1, id);
        }
    } else {
        println!("{}", style("Dependency graph:").bold());
        println!("{}", graph.render_tree());
    }
    Ok(())
}
