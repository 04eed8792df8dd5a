//! Sherwave CLI - Declarative release sync for Kubernetes

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod exit_codes;

use commands::up::UpOptions;

#[derive(Parser)]
#[command(name = "sherwave")]
#[command(author = "Sherwave Contributors")]
#[command(version)]
#[command(about = "Declarative release sync for Kubernetes", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Plan file
    #[arg(short = 'f', long = "file", global = true, default_value = sherwave_core::DEFAULT_PLAN_FILE)]
    file: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync every release of the plan
    Up {
        /// Rehearse only, nothing is changed in the cluster
        #[arg(long)]
        dry_run: bool,

        /// Track rollouts per namespace while applying
        #[arg(long)]
        track: bool,

        /// Only sync releases with these tags (and their dependencies)
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,

        /// Require every tag instead of any
        #[arg(long)]
        match_all_tags: bool,

        /// Skip pack dependency downloads
        #[arg(long)]
        no_deps: bool,

        /// Scratch directory for rendered values, packs and history
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Use this kubeconfig context for every release
        #[arg(long)]
        kube_context: Option<String>,
    },

    /// Show the latest state of releases
    Status {
        /// Release names or ids (all if omitted)
        names: Vec<String>,

        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List installed releases
    List {
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the release dependency graph
    Graph {
        /// Print the sync order instead of the tree
        #[arg(long)]
        order: bool,
    },

    /// Validate the plan and its dependency graph
    Validate,
}

fn init_tracing(debug: bool) {
    let fallback = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env("SHERWAVE_LOG")
        .unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> error::Result<()> {
    match cli.command {
        Commands::Up {
            dry_run,
            track,
            tags,
            match_all_tags,
            no_deps,
            work_dir,
            kube_context,
        } => {
            let options = UpOptions {
                dry_run,
                track,
                tags,
                match_all_tags,
                dependencies: !no_deps,
                work_dir,
                kube_context,
            };
            commands::up::run(&cli.file, &options).await
        }

        Commands::Status {
            names,
            work_dir,
            json,
        } => commands::status::run(&cli.file, &names, work_dir.as_deref(), json).await,

        Commands::List { work_dir, json } => {
            commands::list::run(&cli.file, work_dir.as_deref(), json).await
        }

        Commands::Graph { order } => commands::graph::run(&cli.file, order),

        Commands::Validate => commands::validate::run(&cli.file),
    }
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    let code = match run(cli).await {
        Ok(()) => exit_codes::SUCCESS,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            code
        }
    };
    std::process::exit(code);
}
