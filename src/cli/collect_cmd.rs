use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::cli::renderer;
use crate::core::collectors::{build_collectors, BuildFailure, CollectorKind};
use crate::core::config::AppConfig;
use crate::core::orchestrator::{collect_all, CollectionReport, OutcomeStatus};
use crate::core::snapshot::{FileSnapshotStore, SnapshotKey, SnapshotStore};

pub struct CollectArgs {
    pub collector: Option<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub lookback_days: Option<u32>,
    pub save: bool,
    pub all: bool,
}

#[derive(Serialize)]
struct CollectPayload<'a> {
    collectors: &'a CollectionReport,
    combined_total: f64,
    /// Per-service costs across the collectors that count toward the total
    cost_by_service: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    unavailable: Vec<UnavailablePayload>,
}

#[derive(Serialize)]
struct UnavailablePayload {
    collector: &'static str,
    error: String,
}

/// Save non-degraded results. Returns how many snapshots were written.
pub fn save_snapshots(store: &impl SnapshotStore, report: &CollectionReport) -> Result<usize> {
    let mut saved = 0;
    for outcome in &report.outcomes {
        if outcome.status != OutcomeStatus::Ok {
            continue;
        }
        let key = SnapshotKey::for_data(outcome.collector, &outcome.data);
        store
            .save(&outcome.data, &key)
            .with_context(|| format!("Failed to save snapshot for {}", outcome.collector))?;
        saved += 1;
    }
    Ok(saved)
}

pub async fn run(args: CollectArgs, opts: &OutputOptions) -> Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;

    let only = match &args.collector {
        Some(id) if id != "all" => match CollectorKind::from_id(id) {
            Some(kind) => Some(kind),
            None => bail!("Unknown collector: '{}'", id),
        },
        _ => None,
    };
    if let (Some(start), Some(end)) = (args.start, args.end) {
        if start > end {
            bail!("--start {} is after --end {}", start, end);
        }
    }
    if args.lookback_days == Some(0) {
        bail!("--lookback-days must be at least 1");
    }

    let built = build_collectors(&config, only, args.lookback_days);
    if built.collectors.is_empty() && built.failures.is_empty() {
        eprintln!("No collectors enabled. Run `costguard config init` to set up collectors.");
        return Ok(());
    }

    // Show spinner on stderr (text mode only)
    let spinner = if matches!(opts.format, OutputFormat::Text) && !built.collectors.is_empty() {
        Some(tokio::spawn(async move {
            let frames = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
            let mut i = 0usize;
            loop {
                eprint!("\r {} Collecting costs...", frames[i % frames.len()]);
                i = i.wrapping_add(1);
                tokio::time::sleep(Duration::from_millis(80)).await;
            }
        }))
    } else {
        None
    };

    let deadline = config.settings.run_deadline_secs.map(Duration::from_secs);
    let report = collect_all(built.collectors, args.start, args.end, deadline).await;

    // Stop spinner and clear the line
    if let Some(s) = spinner {
        s.abort();
        eprint!("\r\x1b[2K");
    }

    match opts.format {
        OutputFormat::Text => print_text(&report, &built.failures, args.all, opts),
        OutputFormat::Json => {
            let payload = CollectPayload {
                collectors: &report,
                combined_total: report.combined_total(),
                cost_by_service: report.merged_cost_by_service(),
                unavailable: built
                    .failures
                    .iter()
                    .map(|f| UnavailablePayload {
                        collector: f.kind.id(),
                        error: f.error.to_string(),
                    })
                    .collect(),
            };
            opts.print_json(&payload)?;
        }
    }

    if args.save {
        let dir = config
            .settings
            .snapshot_dir
            .clone()
            .unwrap_or_else(FileSnapshotStore::default_dir);
        let store = FileSnapshotStore::new(dir);
        let saved = save_snapshots(&store, &report)?;
        eprintln!(
            "Saved {} snapshot{} to {}",
            saved,
            if saved == 1 { "" } else { "s" },
            store.root().display()
        );
    }

    Ok(())
}

fn print_text(report: &CollectionReport, failures: &[BuildFailure], show_all: bool, opts: &OutputOptions) {
    let mut sections: Vec<String> = report
        .outcomes
        .iter()
        .map(|outcome| renderer::render_outcome(outcome, show_all, opts.use_color))
        .collect();

    for failure in failures {
        let header = format!(" {} (unavailable)", failure.kind.display_name());
        let msg = format!("  {}\n  Credentials: {}", failure.error, failure.kind.credential_hint());
        if opts.use_color {
            use colored::Colorize;
            colored::control::set_override(true);
            sections.push(format!("{}\n{}", header.bold(), msg.red()));
        } else {
            sections.push(format!("{}\n{}", header, msg));
        }
    }

    if report.outcomes.len() > 1 {
        sections.push(renderer::render_summary(report, opts.use_color));
    }

    println!("{}", sections.join("\n\n"));
}
