pub mod anthropic;
pub mod budgets;
pub mod cost_explorer;
pub mod fetch;
pub mod paging;
pub mod traits;

pub use traits::{first_of_next_month, CollectionPeriod, Collector, CollectorError};

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::aws::Credentials;
use crate::core::config::{AppConfig, CollectorConfig};

pub const DEFAULT_LOOKBACK_DAYS: u32 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorKind {
    Anthropic,
    AwsCostExplorer,
    AwsBudgets,
}

impl CollectorKind {
    pub fn from_id(id: &str) -> Option<Self> {
        match id.to_lowercase().as_str() {
            "anthropic" | "claude" => Some(Self::Anthropic),
            "aws_cost_explorer" | "aws-cost-explorer" | "cost_explorer" | "aws" => {
                Some(Self::AwsCostExplorer)
            }
            "aws_budgets" | "aws-budgets" | "budgets" => Some(Self::AwsBudgets),
            _ => None,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::AwsCostExplorer => "aws_cost_explorer",
            Self::AwsBudgets => "aws_budgets",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Anthropic => "Anthropic",
            Self::AwsCostExplorer => "AWS Cost Explorer",
            Self::AwsBudgets => "AWS Budgets",
        }
    }

    pub fn credential_hint(&self) -> &'static str {
        match self {
            Self::Anthropic => "api_key or ANTHROPIC_ADMIN_KEY",
            Self::AwsCostExplorer | Self::AwsBudgets => {
                "AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY"
            }
        }
    }

    /// Budgets restate spend that Cost Explorer already reports.
    pub fn counts_toward_total(&self) -> bool {
        !matches!(self, Self::AwsBudgets)
    }

    pub fn all() -> &'static [CollectorKind] {
        &[
            CollectorKind::Anthropic,
            CollectorKind::AwsCostExplorer,
            CollectorKind::AwsBudgets,
        ]
    }
}

impl std::fmt::Display for CollectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// A collector that could not be constructed.
#[derive(Debug)]
pub struct BuildFailure {
    pub kind: CollectorKind,
    pub error: CollectorError,
}

/// Collectors ready to run, plus the ones whose construction failed.
pub struct BuiltCollectors {
    pub collectors: Vec<(CollectorKind, Box<dyn Collector>)>,
    pub failures: Vec<BuildFailure>,
}

/// Instantiate collectors from configuration.
///
/// With `only`, that single kind is built whether or not it is enabled.
/// Otherwise every enabled collector is built in configured order. One
/// failing constructor never prevents the others from being built.
pub fn build_collectors(
    config: &AppConfig,
    only: Option<CollectorKind>,
    lookback_override: Option<u32>,
) -> BuiltCollectors {
    let selected: Vec<(CollectorKind, CollectorConfig)> = match only {
        Some(kind) => vec![(
            kind,
            config
                .collector(kind)
                .cloned()
                .unwrap_or_else(|| CollectorConfig::new(kind, true)),
        )],
        None => config
            .enabled_collectors()
            .into_iter()
            .map(|(kind, c)| (kind, c.clone()))
            .collect(),
    };

    let timeout = Duration::from_secs(config.settings.timeout_secs);
    let lookback_days = lookback_override.unwrap_or(config.settings.lookback_days);

    let mut built = BuiltCollectors {
        collectors: Vec::new(),
        failures: Vec::new(),
    };
    for (kind, entry) in selected {
        match build_one(kind, &entry, timeout, lookback_days) {
            Ok(collector) => built.collectors.push((kind, collector)),
            Err(error) => {
                tracing::warn!(collector = kind.id(), error = %error, "Collector unavailable");
                built.failures.push(BuildFailure { kind, error });
            }
        }
    }
    built
}

fn build_one(
    kind: CollectorKind,
    entry: &CollectorConfig,
    timeout: Duration,
    lookback_days: u32,
) -> Result<Box<dyn Collector>, CollectorError> {
    match kind {
        CollectorKind::Anthropic => {
            let mut collector = match &entry.api_key {
                Some(key) => anthropic::AnthropicCostCollector::new(key.clone(), timeout)?,
                None => anthropic::AnthropicCostCollector::from_env(timeout)?,
            }
            .with_lookback_days(lookback_days);
            if let Some(endpoint) = &entry.endpoint {
                collector = collector.with_endpoint(endpoint)?;
            }
            Ok(Box::new(collector))
        }
        CollectorKind::AwsCostExplorer => {
            let mut collector =
                cost_explorer::CostExplorerCollector::new(Credentials::from_env()?, timeout)?
                    .with_lookback_days(lookback_days);
            if let Some(account_id) = &entry.account_id {
                collector = collector.with_account_id(account_id.clone());
            }
            if let Some(endpoint) = &entry.endpoint {
                collector = collector.with_endpoint(endpoint)?;
            }
            Ok(Box::new(collector))
        }
        CollectorKind::AwsBudgets => {
            let account_id = entry.account_id.clone().unwrap_or_default();
            let mut collector =
                budgets::BudgetsCollector::new(Credentials::from_env()?, account_id, timeout)?;
            if let Some(endpoint) = &entry.endpoint {
                collector = collector.with_endpoint(endpoint)?;
            }
            Ok(Box::new(collector))
        }
    }
}
