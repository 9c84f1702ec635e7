use anyhow::{bail, Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::cli::renderer;
use crate::core::collectors::CollectorKind;
use crate::core::config::AppConfig;
use crate::core::orchestrator::{CollectorOutcome, OutcomeStatus};
use crate::core::snapshot::{FileSnapshotStore, SnapshotEntry, SnapshotKey, SnapshotStore};

pub const DEFAULT_CLEAR_DAYS: u32 = 30;

#[derive(Serialize)]
struct EntryPayload {
    collector: String,
    date: NaiveDate,
    path: String,
    size_bytes: u64,
}

impl From<&SnapshotEntry> for EntryPayload {
    fn from(entry: &SnapshotEntry) -> Self {
        Self {
            collector: entry.key.collector.clone(),
            date: entry.key.date,
            path: entry.path.display().to_string(),
            size_bytes: entry.size_bytes,
        }
    }
}

#[derive(Serialize)]
struct ClearPayload {
    cutoff: NaiveDate,
    dry_run: bool,
    snapshots: Vec<EntryPayload>,
}

fn open_store() -> Result<FileSnapshotStore> {
    let config = AppConfig::load().context("Failed to load config")?;
    let dir = config
        .settings
        .snapshot_dir
        .unwrap_or_else(FileSnapshotStore::default_dir);
    Ok(FileSnapshotStore::new(dir))
}

pub fn list(collector: Option<&str>, opts: &OutputOptions) -> Result<()> {
    let store = open_store()?;
    // Accept aliases like "aws" for the directory name the collector saves under.
    let collector = collector.map(|id| CollectorKind::from_id(id).map_or(id, |kind| kind.id()));
    let entries = store
        .list(collector)
        .with_context(|| format!("Failed to list snapshots in {}", store.root().display()))?;

    match opts.format {
        OutputFormat::Json => {
            let payload: Vec<EntryPayload> = entries.iter().map(EntryPayload::from).collect();
            opts.print_json(&payload)?;
        }
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No snapshots in {}", store.root().display());
            } else {
                println!("{}", render_entries(&entries));
            }
        }
    }
    Ok(())
}

/// Print one stored snapshot the same way `collect --all` prints a result.
pub fn show(collector: &str, date: NaiveDate, opts: &OutputOptions) -> Result<()> {
    let Some(kind) = CollectorKind::from_id(collector) else {
        bail!("Unknown collector: '{}'", collector);
    };
    let store = open_store()?;
    let key = SnapshotKey::new(kind.id(), date);
    let Some(data) = store
        .load(&key)
        .with_context(|| format!("Failed to read snapshot {} {}", kind.id(), date))?
    else {
        bail!("No snapshot for {} on {} in {}", kind.id(), date, store.root().display());
    };

    match opts.format {
        OutputFormat::Json => opts.print_json(&data)?,
        OutputFormat::Text => {
            let outcome = CollectorOutcome {
                collector: kind.id(),
                kind,
                status: OutcomeStatus::Ok,
                data,
            };
            println!("{}", renderer::render_outcome(&outcome, true, opts.use_color));
        }
    }
    Ok(())
}

pub fn clear(days: u32, execute: bool, opts: &OutputOptions) -> Result<()> {
    let store = open_store()?;
    let today = Utc::now().date_naive();
    let cutoff = today - Duration::days(i64::from(days));
    let matching = store
        .clear(days, today, !execute)
        .with_context(|| format!("Failed to clear snapshots in {}", store.root().display()))?;

    if matches!(opts.format, OutputFormat::Json) {
        return opts.print_json(&ClearPayload {
            cutoff,
            dry_run: !execute,
            snapshots: matching.iter().map(EntryPayload::from).collect(),
        });
    }

    println!("Clearing snapshots dated on or after {}", cutoff);
    if matching.is_empty() {
        println!("No snapshots to clear.");
        return Ok(());
    }
    println!("{}", render_entries(&matching));

    let count = matching.len();
    let plural = if count == 1 { "" } else { "s" };
    if execute {
        println!("Deleted {} snapshot{}.", count, plural);
    } else {
        println!(
            "Dry run: {} snapshot{} would be deleted. Run with --execute to delete.",
            count, plural
        );
    }
    Ok(())
}

fn render_entries(entries: &[SnapshotEntry]) -> String {
    entries
        .iter()
        .map(|e| {
            format!(
                "  {:<20} {}  {:>8} B  {}",
                e.key.collector,
                e.key.date,
                e.size_bytes,
                e.path.display()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
