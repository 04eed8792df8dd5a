//! Status command - latest recorded state of releases

use console::style;
use sherwave_plan::ReleaseListing;
use std::path::Path;

use super::Clusters;
use crate::error::{CliError, Result};

/// Run the status command
pub async fn run(file: &Path, names: &[String], work_dir: Option<&Path>, json: bool) -> Result<()> {
    let plan = super::load_plan(file)?;
    let settings = super::sync_settings(&plan, work_dir);
    let orchestrator = super::orchestrator(&plan, &settings, &mut Clusters::default())?;

    let listings = orchestrator.status(names).await?;
    print_listings(&listings, json)
}

pub(crate) fn print_listings(listings: &[ReleaseListing], json: bool) -> Result<()> {
    if json {
        let output: Vec<_> = listings
            .iter()
            .map(|l| {
                serde_json::json!({
                    "release": l.id.to_string(),
                    "status": l.status_name(),
                    "revision": l.record.as_ref().map(|r| r.version),
                    "pack": l.record.as_ref().map(|r| format!("{}-{}", r.pack.name, r.pack.version)),
                    "updated": l.record.as_ref().map(|r| r.updated_at.to_rfc3339()),
                })
            })
            .collect();
        let text = serde_json::to_string_pretty(&output).map_err(|e| CliError::Other {
            message: e.to_string(),
        })?;
        println!("{}", text);
        return Ok(());
    }

    println!(
        "{:<32} {:<10} {:<18} {:<24} {:<20}",
        style("RELEASE").bold(),
        style("REVISION").bold(),
        style("STATUS").bold(),
        style("PACK").bold(),
        style("UPDATED").bold()
    );

    for listing in listings {
        let status = listing.status_name();
        let status_styled = match status {
            "deployed" => style(status).green(),
            "failed" => style(status).red(),
            "not-installed" => style(status).dim(),
            s if s.starts_with("pending") => style(status).yellow(),
            _ => style(status).dim(),
        };

        match &listing.record {
            Some(record) => println!(
                "{:<32} {:<10} {:<18} {:<24} {:<20}",
                listing.id.to_string(),
                record.version,
                status_styled,
                format!("{}-{}", record.pack.name, record.pack.version),
                record.updated_at.format("%Y-%m-%d %H:%M:%S")
            ),
            None => println!(
                "{:<32} {:<10} {:<18} {:<24} {:<20}",
                listing.id.to_string(),
                "-",
                status_styled,
                "-",
                "-"
            ),
        }
    }

    Ok(())
}
