//! List command - releases of the plan that have been installed

use std::path::Path;

use super::Clusters;
use crate::error::Result;

/// Run the list command
pub async fn run(file: &Path, work_dir: Option<&Path>, json: bool) -> Result<()> {
    let plan = super::load_plan(file)?;
    let settings = super::sync_settings(&plan, work_dir);
    let orchestrator = super::orchestrator(&plan, &settings, &mut Clusters::default())?;

    let listings = orchestrator.list().await?;
    if listings.is_empty() && !json {
        println!("No releases installed yet");
        return Ok(());
    }
    super::status::print_listings(&listings, json)
}
