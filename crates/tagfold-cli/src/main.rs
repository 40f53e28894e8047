#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use output::{CliError, OutputMode};
use std::env;
use std::path::PathBuf;
use tagfold_core::config;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "tagfold: consolidate support-ticket tag corpora",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Project root holding `tagfold.toml`. Defaults to the current directory.
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Snapshot path, overriding `paths.snapshot`.
    #[arg(long, global = true, value_name = "PATH")]
    snapshot: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Consolidation",
        about = "Rebuild the snapshot from archive pages and the crowdsourcing sheet",
        after_help = "EXAMPLES:\n    # Merge with paths from tagfold.toml\n    tagfold merge\n\n    # Archive only\n    tagfold merge --archive-dir raw_data --no-sheet"
    )]
    Merge(cmd::merge::MergeArgs),

    #[command(
        next_help_heading = "Consolidation",
        about = "Fold microtask results into the snapshot by content fingerprint",
        after_help = "EXAMPLES:\n    tagfold ingest-batch csv/mturk/batch-1.csv csv/mturk/batch-2.csv"
    )]
    IngestBatch(cmd::ingest_batch::IngestBatchArgs),

    #[command(
        next_help_heading = "Views",
        about = "Write the wide or judgment CSV view of the snapshot",
        after_help = "EXAMPLES:\n    tagfold export wide --human-only\n    tagfold export judgments --output csv/judgments.csv"
    )]
    Export(cmd::export::ExportArgs),

    #[command(
        next_help_heading = "Views",
        about = "Select the next annotation batch and write its input sheet",
        after_help = "EXAMPLES:\n    # Reproducible draw of 2000 tickets from the last 540 days\n    tagfold sample --count 2000 --window-days 540 --seed 7"
    )]
    Sample(cmd::sample::SampleArgs),

    #[command(
        next_help_heading = "Views",
        about = "Write cleaned per-ticket text for topic and embedding work",
        after_help = "EXAMPLES:\n    tagfold documents\n    tagfold documents --language de -o data/tickets_de.csv"
    )]
    Documents(cmd::documents::DocumentsArgs),

    #[command(
        next_help_heading = "Inspection",
        about = "Check that the snapshot reads back cleanly"
    )]
    Validate(cmd::validate::ValidateArgs),

    #[command(next_help_heading = "Inspection", about = "Show corpus statistics")]
    Stats(cmd::stats::StatsArgs),

    #[command(about = "Generate shell completions")]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TAGFOLD_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "tagfold=debug,tagfold_core=debug,info"
        } else {
            "tagfold=info,tagfold_core=info,warn"
        })
    });

    let format = env::var("TAGFOLD_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(cli: &Cli, project_root: PathBuf) -> Result<(), (OutputMode, anyhow::Error)> {
    let fallback = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };
    let effective = config::resolve_config(&project_root, cli.json).map_err(|err| (fallback, err))?;
    let output = OutputMode::from_resolved(&effective.resolved_output);
    let project = cmd::Project::new(project_root, effective.project, cli.snapshot.as_deref());

    let result = match &cli.command {
        Commands::Merge(args) => cmd::merge::run_merge(args, &project, output),
        Commands::IngestBatch(args) => {
            cmd::ingest_batch::run_ingest_batch(args, &project, output)
        }
        Commands::Export(args) => cmd::export::run_export(args, &project, output),
        Commands::Sample(args) => cmd::sample::run_sample(args, &project, output),
        Commands::Documents(args) => cmd::documents::run_documents(args, &project, output),
        Commands::Validate(args) => cmd::validate::run_validate(args, &project, output),
        Commands::Stats(args) => cmd::stats::run_stats(args, &project, output),
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    };
    result.map_err(|err| (output, err))
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let project_root = match &cli.root {
        Some(root) => root.clone(),
        None => env::current_dir()?,
    };

    if let Err((output, err)) = run(&cli, project_root) {
        output::render_error(output, &CliError::from_anyhow(&err))?;
        std::process::exit(1);
    }
    Ok(())
}
