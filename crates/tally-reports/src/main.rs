use anyhow::{Context, Result};
use chrono::{Days, Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;
use tally_backend::Backend;
use tally_backend_duckdb::DuckDbBackend;
use tally_reports::errors::ReportError;
use tally_reports::logging::{init_tracing, LogConfig};
use tally_reports::partitions::EXECUTIVE_SUMMARY_PREFIX;
use tally_reports::{
    check_targets, compose_email, exit_code_for, load_json, parse_day, plan_days, run_report,
    summarize, write_report, AlertSender, CommandSender, Config, DryRunSender, LocalBlobStore,
    PassSelection, ReportMode, ReportPass, ReportWindow, RollupSettings, StabilityRollup,
    WindowPartitions,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Telemetry report tooling", long_about = None)]
struct Cli {
    /// Print all the messages
    #[arg(long, global = true)]
    verbose: bool,

    /// Configuration file (default: tally.yml in this or a parent directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the executive summary report as CSV
    Executive(ExecutiveArgs),
    /// Check a day's submission volume against budget targets
    CheckTargets(CheckTargetsArgs),
    /// Write stability rollups for a range of days
    Rollup(RollupArgs),
    /// Rebuild the JSON summaries from existing rollups
    Summarize(SummarizeArgs),
}

#[derive(Args)]
struct ExecutiveArgs {
    /// Start day of the reporting period (YYYYMMDD)
    #[arg(long)]
    report_start: String,

    /// Report mode: weekly or monthly
    #[arg(long, default_value = "monthly")]
    mode: String,

    /// Database to connect to (DuckDB file path or :memory:)
    #[arg(long)]
    db_url: Option<String>,

    /// Last day with complete data (YYYYMMDD); later partitions are never read
    #[arg(long)]
    cutoff: Option<String>,

    /// Skip partitions that do not exist instead of failing
    #[arg(long)]
    check_partitions: bool,

    /// Print the queries instead of running them
    #[arg(long)]
    dry_run: bool,

    /// Skip computation of easy aggregates
    #[arg(long)]
    skip_easy: bool,

    /// Skip computation of client aggregates
    #[arg(long)]
    skip_client: bool,

    /// Skip computation of inactive count
    #[arg(long)]
    skip_inactive: bool,

    /// Skip computation of five-of-seven count
    #[arg(long)]
    skip_fos: bool,

    /// Write the report here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct CheckTargetsArgs {
    /// Day to check (YYYYMMDD)
    #[arg(long)]
    day: String,

    /// JSON file containing budget targets
    #[arg(long)]
    targets_file: PathBuf,

    /// JSON file containing observed data
    #[arg(long)]
    data_file: PathBuf,

    /// Email 'from:' address
    #[arg(long)]
    from_email: Option<String>,

    /// Email 'to:' address (multiple allowed)
    #[arg(long)]
    to_email: Vec<String>,

    /// Print out what would happen instead of sending alert email
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct RollupArgs {
    /// First day to roll up (YYYYMMDD, default: yesterday)
    start: Option<String>,

    /// Last day to roll up (YYYYMMDD, default: START)
    end: Option<String>,

    /// Database to connect to (DuckDB file path or :memory:)
    #[arg(long)]
    db_url: Option<String>,

    /// Recompute the specified days only
    #[arg(long)]
    no_latency: bool,

    /// Last day with complete data (YYYYMMDD, default: yesterday)
    #[arg(long)]
    cutoff: Option<String>,

    /// Skip partitions that do not exist instead of failing
    #[arg(long)]
    check_partitions: bool,

    /// Also write the weekly actives rollup for each day
    #[arg(long)]
    weekly_actives: bool,

    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Args)]
struct SummarizeArgs {
    /// First day to summarize (YYYYMMDD)
    start: String,

    /// Last day to summarize (YYYYMMDD, default: START)
    end: Option<String>,

    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Args)]
struct StoreArgs {
    /// Directory holding one subdirectory per bucket
    #[arg(long)]
    store_root: Option<PathBuf>,

    /// Bucket for rollup objects
    #[arg(long)]
    bucket: Option<String>,
}

impl StoreArgs {
    fn resolve(&self, config: &Config) -> (LocalBlobStore, String) {
        let root = self.store_root.clone().unwrap_or_else(|| config.store_root());
        let bucket = self.bucket.clone().unwrap_or_else(|| config.store.bucket.clone());
        (LocalBlobStore::new(root), bucket)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&LogConfig::from_verbosity(cli.verbose));

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(error) => {
            eprintln!("Error: {:#}", error);
            ExitCode::from(exit_code_for(&error))
        }
    }
}

fn run(cli: Cli) -> Result<u8> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::discover(&std::env::current_dir()?)?,
    };

    match cli.command {
        Commands::Executive(args) => executive(args, &config),
        Commands::CheckTargets(args) => check(args, &config),
        Commands::Rollup(args) => rollup(args, &config),
        Commands::Summarize(args) => summarize_days(args, &config),
    }
}

fn connect(db_url: Option<String>, config: &Config) -> Result<DuckDbBackend> {
    let db_url = db_url
        .or_else(|| config.database())
        .ok_or(ReportError::MissingSetting { name: "db-url" })?;
    info!(database = %db_url, "connecting");
    DuckDbBackend::connect(&db_url)
        .with_context(|| format!("Failed to connect to database {}", db_url))
}

fn yesterday() -> NaiveDate {
    let today = Local::now().date_naive();
    today.checked_sub_days(Days::new(1)).unwrap_or(today)
}

fn executive(args: ExecutiveArgs, config: &Config) -> Result<u8> {
    let anchor = parse_day(&args.report_start)?;
    let mode: ReportMode = args.mode.parse()?;
    let cutoff = args.cutoff.as_deref().map(parse_day).transpose()?;
    let window = ReportWindow::resolve(anchor, mode, cutoff);
    info!(%anchor, %mode, this_period = window.this_period().len(), "resolved report window");

    let selection = PassSelection {
        simple: !args.skip_easy,
        client: !args.skip_client,
        inactive: !args.skip_inactive,
        frequency: !args.skip_fos,
    };

    let backend = if args.dry_run && !args.check_partitions {
        None
    } else {
        Some(connect(args.db_url.clone(), config)?)
    };
    let known_tables: Option<BTreeSet<String>> = match &backend {
        Some(backend) if args.check_partitions => Some(
            backend
                .list_tables(EXECUTIVE_SUMMARY_PREFIX)
                .context("Failed to list partition tables")?,
        ),
        _ => None,
    };

    let backend = match backend {
        Some(backend) if !args.dry_run => backend,
        _ => {
            let partitions = WindowPartitions::resolve(&window, known_tables.as_ref());
            for pass in ReportPass::ALL.into_iter().filter(|p| selection.includes(*p)) {
                if let Some(query) = partitions.query(pass) {
                    println!("-- {}\n{};\n", pass, query.inline());
                }
            }
            return Ok(0);
        }
    };

    let report = run_report(&backend, &window, known_tables.as_ref(), selection)
        .context("Failed to generate executive report")?;
    info!(rows = report.len(), "report complete");

    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            write_report(&mut BufWriter::new(file), &report)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        None => write_report(&mut io::stdout().lock(), &report)
            .context("Failed to write report")?,
    }
    Ok(0)
}

fn check(args: CheckTargetsArgs, config: &Config) -> Result<u8> {
    parse_day(&args.day)?;
    let targets = load_json(&args.targets_file)?;
    let observed = load_json(&args.data_file)?;

    let from = args
        .from_email
        .or_else(|| config.alerts.from.clone())
        .ok_or(ReportError::MissingSetting { name: "from-email" })?;
    let to = if args.to_email.is_empty() {
        config.alerts.to.clone()
    } else {
        args.to_email
    };
    if to.is_empty() {
        return Err(ReportError::MissingSetting { name: "to-email" }.into());
    }

    let report = check_targets(&args.day, &targets, &observed);
    if let Some(error) = &report.data_error {
        eprintln!("{}", error);
    }

    match compose_email(&args.day, &from, &to, &report.alerts) {
        Some(email) if args.dry_run => DryRunSender.send(&email)?,
        Some(email) => {
            let command = config
                .alerts
                .mail_command
                .as_deref()
                .ok_or(ReportError::MissingSetting {
                    name: "alerts.mail_command",
                })?;
            CommandSender::from_command_line(command)?.send(&email)?;
        }
        None if args.dry_run => println!("Dry-run mode, but would not have sent any alerts."),
        None => {}
    }

    Ok(report.exit_code())
}

fn rollup(args: RollupArgs, config: &Config) -> Result<u8> {
    let cutoff = match &args.cutoff {
        Some(day) => parse_day(day)?,
        None => yesterday(),
    };
    let start = match &args.start {
        Some(day) => parse_day(day)?,
        None => yesterday(),
    };
    let end = match &args.end {
        Some(day) => parse_day(day)?,
        None => start,
    };

    let latency_interval = config.rollup.latency_interval;
    let days = plan_days(start, end, cutoff, (!args.no_latency).then_some(latency_interval))?;

    let backend = connect(args.db_url.clone(), config)?;
    let (store, bucket) = args.store.resolve(config);
    let settings = RollupSettings {
        bucket,
        latency_interval,
        cutoff,
        check_partitions: args.check_partitions || config.rollup.check_partitions,
        weekly_actives: args.weekly_actives,
    };
    let rollup = StabilityRollup::new(&backend, &store, settings)
        .context("Failed to prepare rollups")?;

    for day in days {
        rollup
            .put_daily(day)
            .with_context(|| format!("Failed to generate rollups for {}", day))?;
    }
    Ok(0)
}

fn summarize_days(args: SummarizeArgs, config: &Config) -> Result<u8> {
    let start = parse_day(&args.start)?;
    let end = match &args.end {
        Some(day) => parse_day(day)?,
        None => start,
    };
    if start > end {
        return Err(ReportError::EmptyDateRange { start, end }.into());
    }

    let (store, bucket) = args.store.resolve(config);
    for day in start.iter_days().take_while(|day| *day <= end) {
        summarize(&store, &bucket, day)
            .with_context(|| format!("Failed to summarize {}", day))?;
    }
    Ok(0)
}
