use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::collectors::fetch::validate_endpoint;
use crate::core::collectors::CollectorKind;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_format")]
    pub default_format: String,
    #[serde(default = "default_color")]
    pub color: String,
    /// Days of daily history used for the trend
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Per-request HTTP timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Overall deadline for one collection run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_deadline_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_dir: Option<PathBuf>,
}

fn default_format() -> String {
    "text".to_string()
}
fn default_color() -> String {
    "auto".to_string()
}
fn default_lookback_days() -> u32 {
    crate::core::collectors::DEFAULT_LOOKBACK_DAYS
}
fn default_timeout_secs() -> u64 {
    crate::core::collectors::fetch::DEFAULT_TIMEOUT_SECS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_format: default_format(),
            color: default_color(),
            lookback_days: default_lookback_days(),
            timeout_secs: default_timeout_secs(),
            run_deadline_secs: None,
            snapshot_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    pub id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Anthropic Admin API key; `ANTHROPIC_ADMIN_KEY` is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Override of the provider's API base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// AWS account the collector reports on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

fn default_true() -> bool {
    true
}

impl CollectorConfig {
    pub fn new(kind: CollectorKind, enabled: bool) -> Self {
        Self {
            id: kind.id().to_string(),
            enabled,
            api_key: None,
            endpoint: None,
            account_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub collectors: Vec<CollectorConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            collectors: CollectorKind::all()
                .iter()
                .map(|kind| CollectorConfig::new(*kind, *kind == CollectorKind::Anthropic))
                .collect(),
        }
    }
}

impl AppConfig {
    /// Get the config file path, respecting XDG_CONFIG_HOME
    pub fn config_path() -> PathBuf {
        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("~"))
                    .join(".config")
            });
        config_dir.join("costguard").join("config.toml")
    }

    /// Load config from the default path, falling back to defaults if not found
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Serialize and write this config to the config file path.
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path();
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn collector(&self, kind: CollectorKind) -> Option<&CollectorConfig> {
        self.collectors.iter().find(|c| c.id == kind.id())
    }

    /// Enabled collectors in configured order. Unknown ids are skipped.
    pub fn enabled_collectors(&self) -> Vec<(CollectorKind, &CollectorConfig)> {
        self.collectors
            .iter()
            .filter(|c| c.enabled)
            .filter_map(|c| CollectorKind::from_id(&c.id).map(|kind| (kind, c)))
            .collect()
    }

    /// Flip a collector on or off, adding an entry when it is missing.
    /// Returns whether anything changed.
    pub fn set_enabled(&mut self, kind: CollectorKind, enabled: bool) -> bool {
        match self.collectors.iter_mut().find(|c| c.id == kind.id()) {
            Some(existing) if existing.enabled == enabled => false,
            Some(existing) => {
                existing.enabled = enabled;
                true
            }
            None if !enabled => false,
            None => {
                self.collectors.push(CollectorConfig::new(kind, true));
                true
            }
        }
    }

    /// Validate the config
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if !["text", "json"].contains(&self.settings.default_format.as_str()) {
            issues.push(format!(
                "Invalid default_format: '{}' (must be 'text' or 'json')",
                self.settings.default_format
            ));
        }
        if !["auto", "always", "never"].contains(&self.settings.color.as_str()) {
            issues.push(format!(
                "Invalid color: '{}' (must be 'auto', 'always', or 'never')",
                self.settings.color
            ));
        }
        if self.settings.lookback_days == 0 {
            issues.push("lookback_days must be at least 1".to_string());
        }
        if self.settings.timeout_secs == 0 {
            issues.push("timeout_secs must be at least 1".to_string());
        }
        if self.settings.run_deadline_secs == Some(0) {
            issues.push("run_deadline_secs must be at least 1".to_string());
        }

        let mut seen = Vec::new();
        for c in &self.collectors {
            let Some(kind) = CollectorKind::from_id(&c.id) else {
                issues.push(format!("Unknown collector ID: '{}'", c.id));
                continue;
            };
            if seen.contains(&kind) {
                issues.push(format!("Collector '{}' is configured more than once", c.id));
            }
            seen.push(kind);

            if let Some(endpoint) = &c.endpoint {
                if let Err(e) = validate_endpoint(endpoint, kind.display_name()) {
                    issues.push(format!("Collector '{}': {e}", c.id));
                }
            }
            if c.api_key.is_some() && kind != CollectorKind::Anthropic {
                issues.push(format!(
                    "Collector '{}': api_key is not used (credentials come from {})",
                    c.id,
                    kind.credential_hint()
                ));
            }
            if c.enabled
                && kind == CollectorKind::AwsBudgets
                && c.account_id.as_deref().map_or(true, |a| a.trim().is_empty())
            {
                issues.push(format!("Collector '{}': account_id is required", c.id));
            }
        }
        issues
    }
}
