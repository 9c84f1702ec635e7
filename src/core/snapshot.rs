//! File-backed store for collected [`CostData`] snapshots.
//!
//! Layout: `<root>/<collector>/<YYYY-MM-DD>.json`, one file per collector and
//! period end date. Saving the same key again overwrites the earlier file.

use chrono::{Duration, NaiveDate};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::core::models::cost::CostData;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Snapshot I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Invalid snapshot key: {0}")]
    InvalidKey(String),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> SnapshotError + '_ {
    move |source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SnapshotKey {
    pub collector: String,
    pub date: NaiveDate,
}

impl SnapshotKey {
    pub fn new(collector: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            collector: collector.into(),
            date,
        }
    }

    /// Key for a collection result: the collector plus the period end date.
    pub fn for_data(collector: &str, data: &CostData) -> Self {
        Self::new(collector, data.end_date)
    }

    fn validate(&self) -> Result<(), SnapshotError> {
        let valid = !self.collector.is_empty()
            && self
                .collector
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(())
        } else {
            Err(SnapshotError::InvalidKey(self.collector.clone()))
        }
    }
}

/// Where collection results end up.
pub trait SnapshotStore {
    fn save(&self, data: &CostData, key: &SnapshotKey) -> Result<PathBuf, SnapshotError>;
    fn load(&self, key: &SnapshotKey) -> Result<Option<CostData>, SnapshotError>;
}

#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    pub key: SnapshotKey,
    pub path: PathBuf,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    root: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$XDG_DATA_HOME/costguard/snapshots`, falling back to
    /// `~/.local/share/costguard/snapshots`.
    pub fn default_dir() -> PathBuf {
        let base = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("~"))
                    .join(".local")
                    .join("share")
            });
        base.join("costguard").join("snapshots")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &SnapshotKey) -> PathBuf {
        self.root
            .join(&key.collector)
            .join(format!("{}.json", key.date.format("%Y-%m-%d")))
    }

    /// All snapshots, optionally for one collector, sorted by collector then
    /// date. Files that do not look like snapshots are ignored.
    pub fn list(&self, collector: Option<&str>) -> Result<Vec<SnapshotEntry>, SnapshotError> {
        let mut entries = Vec::new();
        if !self.root.exists() {
            return Ok(entries);
        }

        for dir in std::fs::read_dir(&self.root).map_err(io_error(&self.root))? {
            let dir = dir.map_err(io_error(&self.root))?;
            let dir_path = dir.path();
            if !dir_path.is_dir() {
                continue;
            }
            let Some(name) = dir_path.file_name().and_then(|n| n.to_str()).map(str::to_string)
            else {
                continue;
            };
            if collector.is_some_and(|c| c != name) {
                continue;
            }

            for file in std::fs::read_dir(&dir_path).map_err(io_error(&dir_path))? {
                let file = file.map_err(io_error(&dir_path))?;
                let path = file.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let Some(date) = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                else {
                    debug!(path = %path.display(), "Ignoring non-snapshot file");
                    continue;
                };
                let size_bytes = file.metadata().map(|m| m.len()).unwrap_or(0);
                entries.push(SnapshotEntry {
                    key: SnapshotKey::new(name.clone(), date),
                    path,
                    size_bytes,
                });
            }
        }

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    /// Snapshots dated within the last `days` days of `today` (inclusive).
    /// With `dry_run` nothing is deleted; the matching entries are returned
    /// either way.
    pub fn clear(
        &self,
        days: u32,
        today: NaiveDate,
        dry_run: bool,
    ) -> Result<Vec<SnapshotEntry>, SnapshotError> {
        let cutoff = today - Duration::days(i64::from(days));
        let matching: Vec<SnapshotEntry> = self
            .list(None)?
            .into_iter()
            .filter(|e| e.key.date >= cutoff)
            .collect();

        if !dry_run {
            for entry in &matching {
                std::fs::remove_file(&entry.path).map_err(io_error(&entry.path))?;
                debug!(path = %entry.path.display(), "Deleted snapshot");
            }
        }
        Ok(matching)
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&self, data: &CostData, key: &SnapshotKey) -> Result<PathBuf, SnapshotError> {
        key.validate()?;
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        let json = serde_json::to_string_pretty(data)?;
        std::fs::write(&path, json).map_err(io_error(&path))?;
        debug!(path = %path.display(), "Saved snapshot");
        Ok(path)
    }

    fn load(&self, key: &SnapshotKey) -> Result<Option<CostData>, SnapshotError> {
        key.validate()?;
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path)(e)),
        }
    }
}
