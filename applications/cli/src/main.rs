/// Crate Digger - import audio files into an organized, tagged library
mod config;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use crate::config::CliConfig;
use cratedig_core::DuplicateDecision;
use cratedig_importer::{
    FileManagementStrategy, ImportProgress, ImportSummary, MusicImporter, QuietDecider,
    QuietFallback,
};
use cratedig_metadata::LoftyTagCodec;
use cratedig_storage::SqliteCatalog;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cratedig")]
#[command(about = "Import audio files into an organized, tagged library", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "CRATEDIG_CONFIG")]
    config: Option<PathBuf>,

    /// Catalog database URL
    #[arg(long, global = true, env = "CRATEDIG_DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a directory tree or a single file
    Import(ImportArgs),
    /// Show catalog row counts
    Stats,
}

#[derive(clap::Args)]
struct ImportArgs {
    /// Directory or file to import
    path: PathBuf,

    /// Library root
    #[arg(short, long)]
    library: Option<PathBuf>,

    /// How files reach the library
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,

    /// Import every file as a singleton
    #[arg(long)]
    singletons: bool,

    /// Ignore the resume journal
    #[arg(long)]
    no_resume: bool,

    /// Process groups the journal marks as finished
    #[arg(long)]
    force: bool,

    /// Leave tags in the files untouched
    #[arg(long)]
    no_write_tags: bool,

    /// Resume journal location
    #[arg(long)]
    journal: Option<PathBuf>,

    /// Import unmatched groups with their own tags instead of skipping them
    #[arg(long)]
    as_is: bool,

    /// What to do when the catalog already holds a group
    #[arg(long, value_enum)]
    duplicates: Option<DuplicateArg>,

    /// Minimum similarity for automatic acceptance (0-1)
    #[arg(long)]
    threshold: Option<f64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Copy,
    Move,
    Reference,
}

#[derive(Clone, Copy, ValueEnum)]
enum DuplicateArg {
    Skip,
    KeepBoth,
    RemoveOld,
    Merge,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cratedig=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let mut config = CliConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }

    match cli.command {
        Commands::Import(args) => import(config, args).await,
        Commands::Stats => {
            let catalog = open_catalog(&config.database_url).await?;
            let stats = catalog.stats().await?;
            println!("{} albums, {} items", stats.albums, stats.items);
            Ok(0)
        }
    }
}

async fn open_catalog(database_url: &str) -> anyhow::Result<SqliteCatalog> {
    let pool = cratedig_storage::create_pool(database_url)
        .await
        .with_context(|| format!("Failed to open catalog {database_url}"))?;
    cratedig_storage::run_migrations(&pool).await?;
    tracing::info!("Database connected");
    Ok(SqliteCatalog::new(pool))
}

async fn import(config: CliConfig, args: ImportArgs) -> anyhow::Result<u8> {
    let mut import = config.import;
    if let Some(library) = args.library {
        import.library_path = library;
    }
    if let Some(strategy) = args.strategy {
        import.file_strategy = match strategy {
            StrategyArg::Copy => FileManagementStrategy::Copy,
            StrategyArg::Move => FileManagementStrategy::Move,
            StrategyArg::Reference => FileManagementStrategy::Reference,
        };
    }
    if let Some(journal) = args.journal {
        import.journal_path = journal;
    }
    if let Some(duplicates) = args.duplicates {
        import.duplicate_action = match duplicates {
            DuplicateArg::Skip => DuplicateDecision::SkipNew,
            DuplicateArg::KeepBoth => DuplicateDecision::KeepBoth,
            DuplicateArg::RemoveOld => DuplicateDecision::RemoveOld,
            DuplicateArg::Merge => DuplicateDecision::Merge,
        };
    }
    if let Some(threshold) = args.threshold {
        import.matching.auto_accept_threshold = threshold;
    }
    import.singletons |= args.singletons;
    import.force_reprocess |= args.force;
    if args.no_resume {
        import.resume = false;
    }
    if args.no_write_tags {
        import.write_tags = false;
    }
    if args.as_is {
        import.quiet_fallback = QuietFallback::AsIs;
    }

    let catalog = open_catalog(&config.database_url).await?;
    let decider = QuietDecider::from_config(&import);

    let (tx, rx) = mpsc::channel::<ImportProgress>(64);
    let importer = MusicImporter::new(
        import,
        Arc::new(LoftyTagCodec::new()),
        Arc::new(catalog),
        Arc::new(decider),
    )?
    .with_progress(tx);

    let abort = importer.abort_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing tasks in flight");
            abort.raise();
        }
    });

    let spinner = create_spinner("Importing");
    let reporter = tokio::spawn(report_progress(rx, spinner.clone()));

    let summary = importer.run(&args.path).await;
    drop(importer);
    let _ = reporter.await;
    spinner.finish_and_clear();

    let summary = summary?;
    print_summary(&summary);
    Ok(summary.exit_code() as u8)
}

fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{msg} {spinner} [{elapsed_precise}]") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(msg.to_string());
    pb
}

async fn report_progress(mut rx: mpsc::Receiver<ImportProgress>, pb: ProgressBar) {
    while let Some(progress) = rx.recv().await {
        let current = progress
            .current
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        pb.set_message(format!(
            "{} groups ({} done, {} skipped, {} failed) {current}",
            progress.processed, progress.done, progress.skipped, progress.failed
        ));
    }
}

fn print_summary(summary: &ImportSummary) {
    for report in &summary.reports {
        let outcome = report.outcome.to_string();
        match &report.error {
            Some(error) => println!("{outcome:>8}  {}  ({error})", report.key),
            None => println!("{outcome:>8}  {}", report.key),
        }
    }
    println!("{} in {}s", summary.summary_text(), summary.duration_seconds);
    if summary.aborted {
        println!("Import was aborted; run again to resume");
    }
}
