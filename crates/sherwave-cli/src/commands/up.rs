//! Up command - sync every release of a plan

use console::style;
use std::path::{Path, PathBuf};

use super::Clusters;
use crate::error::{CliError, Result};

/// Flags of `sherwave up`
#[derive(Debug, Clone, Default)]
pub struct UpOptions {
    pub dry_run: bool,
    pub track: bool,
    pub tags: Vec<String>,
    pub match_all_tags: bool,
    pub dependencies: bool,
    pub work_dir: Option<PathBuf>,
    pub kube_context: Option<String>,
}

/// Run the up command
pub async fn run(file: &Path, options: &UpOptions) -> Result<()> {
    let plan = super::load_plan(file)?.filter_by_tags(&options.tags, options.match_all_tags)?;
    if plan.releases.is_empty() {
        return Err(CliError::Validation {
            message: "no release matches the selected tags".to_string(),
            help: Some(format!("tags: {}", options.tags.join(", "))),
        });
    }

    let mut settings = super::sync_settings(&plan, options.work_dir.as_deref());
    settings.dependencies = options.dependencies;
    settings.kube_context = options.kube_context.clone();

    println!(
        "{} Syncing {} release(s) of {}",
        style("→").blue().bold(),
        style(plan.releases.len()).yellow(),
        style(if plan.project.is_empty() { "plan" } else { plan.project.as_str() }).cyan()
    );

    let mut clusters = Clusters::default();
    let orchestrator = super::orchestrator(&plan, &settings, &mut clusters)?;

    if options.dry_run {
        orchestrator.sync_dry_run(&settings).await?;
        println!(
            "{} Rehearsal succeeded, nothing was applied",
            style("✓").green().bold()
        );
        return Ok(());
    }

    if options.track || plan.tracking.enabled {
        let context = options
            .kube_context
            .clone()
            .unwrap_or_else(|| plan.tracking.context.clone());
        let tracker_cluster = clusters.get(&context);
        orchestrator
            .sync_with_tracking(&settings, &plan.tracking, tracker_cluster)
            .await?;
        println!(
            "{} Synced {} release(s), rollouts complete",
            style("✓").green().bold(),
            style(plan.releases.len()).yellow()
        );
    } else {
        orchestrator.sync(&settings).await?;
        println!(
            "{} Synced {} release(s)",
            style("✓").green().bold(),
            style(plan.releases.len()).yellow()
        );
    }

    Ok(())
}
