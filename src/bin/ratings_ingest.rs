use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use internal_ratings_ingest::alert::ConfiguredAlerter;
use internal_ratings_ingest::app::{self, App, RunOptions};
use internal_ratings_ingest::config::{ConfigLoader, ResolvedConfig};
use internal_ratings_ingest::domain::{RelationshipRecord, SnapshotDate};
use internal_ratings_ingest::error::IngestError;
use internal_ratings_ingest::feed::{Fetcher, HttpFeedTransport};
use internal_ratings_ingest::output::{HumanOutput, JsonOutput, OutputMode};
use internal_ratings_ingest::persist::{BulkPersister, BulkWriter};
use internal_ratings_ingest::progress::TracingSink;
use internal_ratings_ingest::sqlite::SqliteBulkWriter;

#[derive(Parser)]
#[command(name = "ratings-ingest")]
#[command(about = "Fetch the internal ratings feed and bulk-load it into SQLite")]
#[command(version, author)]
struct Cli {
    /// Print results as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch the feed and load it")]
    Run(RunArgs),
    #[command(about = "Load a saved payload file (gzip, deflate or plain JSON)")]
    Load(FileArgs),
    #[command(about = "Decode and normalize a payload file without writing anything")]
    Inspect(InspectArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Request pages until one comes back empty
    #[arg(long)]
    paginate: bool,

    /// Override the configured snapshot date (YYYY-MM-DD)
    #[arg(long)]
    snapshot_date: Option<String>,

    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct FileArgs {
    path: String,
}

#[derive(Args)]
struct InspectArgs {
    path: String,

    #[arg(long, default_value_t = 5)]
    sample: usize,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<IngestError>() {
            eprintln!("{} records committed before failure", err.committed());
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &IngestError) -> u8 {
    match error {
        IngestError::MissingConfig
        | IngestError::ConfigRead(_)
        | IngestError::ConfigParse(_)
        | IngestError::InvalidConfig(_) => 2,
        IngestError::Transport(_)
        | IngestError::FetchFailed { .. }
        | IngestError::ServerRejection { .. } => 3,
        IngestError::MalformedPayload(_) => 4,
        IngestError::PersistenceFailure { .. } | IngestError::Storage(_) => 5,
        IngestError::Filesystem(_) => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    match cli.command {
        Commands::Run(args) => {
            let config = ConfigLoader::resolve(cli.config.as_deref(), false)?;
            run_feed(args, &config, output_mode)
        }
        Commands::Load(args) => {
            let config = ConfigLoader::resolve(cli.config.as_deref(), true)?;
            run_load(args, &config, output_mode)
        }
        Commands::Inspect(args) => {
            let config = ConfigLoader::resolve(cli.config.as_deref(), true)?;
            run_inspect(args, &config, output_mode)
        }
    }
}

fn run_feed(args: RunArgs, config: &ResolvedConfig, output_mode: OutputMode) -> miette::Result<()> {
    let (endpoint, token) = config.require_network()?;
    let transport = HttpFeedTransport::new(endpoint, token, config.feed.timeout)?;
    let alerter = ConfiguredAlerter::from_webhook(config.alert_webhook.as_deref())?;
    let fetcher = Fetcher::new(transport, alerter, config.feed.retry, config.normalize);
    let app = App::new(fetcher, BulkPersister::new(config.persist));

    let snapshot_date = match args.snapshot_date {
        Some(value) => Some(value.parse::<SnapshotDate>()?),
        None => config.feed.snapshot_date,
    };
    let options = RunOptions {
        snapshot_date,
        paginate: args.paginate || config.feed.paginate,
        pagination: config.feed.pagination,
        dry_run: args.dry_run,
    };

    let report = if args.dry_run {
        app.run(options, &NoWriter, &TracingSink)?
    } else {
        let writer = SqliteBulkWriter::open(&config.database, &config.table)?;
        app.run(options, &writer, &TracingSink)?
    };
    print_report(&report, output_mode)
}

fn run_load(args: FileArgs, config: &ResolvedConfig, output_mode: OutputMode) -> miette::Result<()> {
    let bytes = std::fs::read(&args.path)
        .map_err(|err| IngestError::Filesystem(format!("read {}: {err}", args.path)))?;
    let writer = SqliteBulkWriter::open(&config.database, &config.table)?;
    let report = app::load_payload(
        &bytes,
        config.normalize,
        &BulkPersister::new(config.persist),
        &writer,
        &TracingSink,
    )?;
    print_report(&report, output_mode)
}

fn run_inspect(
    args: InspectArgs,
    config: &ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let bytes = std::fs::read(&args.path)
        .map_err(|err| IngestError::Filesystem(format!("read {}: {err}", args.path)))?;
    let result = app::inspect(&bytes, config.normalize, args.sample)?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_inspect(&result).into_diagnostic(),
        OutputMode::Human => HumanOutput::print_inspect(&result).into_diagnostic(),
    }
}

fn print_report(report: &app::IngestReport, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::Json => JsonOutput::print_report(report).into_diagnostic(),
        OutputMode::Human => HumanOutput::print_report(report).into_diagnostic(),
    }
}

/// Stands in for the store on dry runs, which return before persisting.
struct NoWriter;

impl BulkWriter for NoWriter {
    fn write_batch(&self, _rows: &[RelationshipRecord]) -> Result<usize, IngestError> {
        Err(IngestError::Storage("dry run does not write".to_string()))
    }
}
