mod cli;
mod core;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cli::collect_cmd::CollectArgs;
use crate::cli::output::{detect_color, OutputFormat, OutputOptions};
use crate::cli::snapshot_cmd::DEFAULT_CLEAR_DAYS;
use crate::core::config::AppConfig;

#[derive(Parser)]
#[command(
    name = "costguard",
    about = "Collect API and cloud costs, track daily trends, keep snapshots",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Output format (text|json)
    #[arg(short, long, global = true)]
    format: Option<String>,

    /// Shorthand for --format json
    #[arg(short = 'j', long = "json", global = true)]
    json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    /// Verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect costs from the enabled collectors
    Collect {
        /// Collector to run (default: all enabled)
        #[arg(short, long)]
        collector: Option<String>,

        /// First day of the snapshot window (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        start: Option<NaiveDate>,

        /// Day after the snapshot window (YYYY-MM-DD, default: today)
        #[arg(long, value_parser = parse_date)]
        end: Option<NaiveDate>,

        /// Days of history used for the trend
        #[arg(long)]
        lookback_days: Option<u32>,

        /// Write a snapshot per successful collector
        #[arg(long)]
        save: bool,

        /// Show every service and the daily breakdown
        #[arg(short, long)]
        all: bool,
    },
    /// Inspect or prune stored snapshots
    Snapshots {
        #[command(subcommand)]
        action: SnapshotAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// List stored snapshots
    List {
        /// Only snapshots from this collector
        #[arg(short, long)]
        collector: Option<String>,
    },
    /// Print one stored snapshot
    Show {
        /// Collector ID
        collector: String,

        /// Period end date of the snapshot (YYYY-MM-DD)
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
    },
    /// Delete snapshots dated within the last N days (dry run unless --execute)
    Clear {
        #[arg(long, default_value_t = DEFAULT_CLEAR_DAYS)]
        days: u32,

        /// Actually delete the files
        #[arg(long)]
        execute: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Generate default config file
    Init,
    /// Validate config file
    Check,
    /// Enable a collector
    Add {
        /// Collector ID to enable
        collector: String,
    },
    /// Disable a collector
    Remove {
        /// Collector ID to disable
        collector: String,
    },
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {}", e))
}

fn init_logging(verbose: bool) {
    let default = if verbose { "warn,costguard=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // A broken config surfaces through the command itself; output falls back to defaults.
    let settings = AppConfig::load().map(|c| c.settings).unwrap_or_default();
    let output_opts = OutputOptions {
        format: OutputFormat::resolve(cli.json, cli.format.as_deref(), &settings),
        pretty: cli.pretty,
        use_color: detect_color(!cli.no_color, &settings.color),
    };

    match cli.command {
        None => {
            let args = CollectArgs {
                collector: None,
                start: None,
                end: None,
                lookback_days: None,
                save: false,
                all: false,
            };
            cli::collect_cmd::run(args, &output_opts).await?;
        }
        Some(Commands::Collect {
            collector,
            start,
            end,
            lookback_days,
            save,
            all,
        }) => {
            let args = CollectArgs {
                collector,
                start,
                end,
                lookback_days,
                save,
                all,
            };
            cli::collect_cmd::run(args, &output_opts).await?;
        }
        Some(Commands::Snapshots { action }) => match action {
            SnapshotAction::List { collector } => {
                cli::snapshot_cmd::list(collector.as_deref(), &output_opts)?
            }
            SnapshotAction::Show { collector, date } => {
                cli::snapshot_cmd::show(&collector, date, &output_opts)?
            }
            SnapshotAction::Clear { days, execute } => {
                cli::snapshot_cmd::clear(days, execute, &output_opts)?
            }
        },
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init => cli::config_cmd::init(&output_opts)?,
            ConfigAction::Check => cli::config_cmd::check(&output_opts)?,
            ConfigAction::Add { collector } => cli::config_cmd::add(&collector, &output_opts)?,
            ConfigAction::Remove { collector } => {
                cli::config_cmd::remove(&collector, &output_opts)?
            }
        },
    }

    Ok(())
}
