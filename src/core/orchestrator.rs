//! Runs collectors side by side and isolates their failures.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, warn};

use crate::core::collectors::{CollectionPeriod, Collector, CollectorKind};
use crate::core::cost::money::{from_f64, round_total, to_f64};
use crate::core::models::cost::CostData;

const DEADLINE_EXCEEDED: &str = "deadline exceeded";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Ok,
    /// The collector task panicked or missed the run deadline.
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectorOutcome {
    pub collector: &'static str,
    #[serde(skip)]
    pub kind: CollectorKind,
    #[serde(flatten)]
    pub status: OutcomeStatus,
    pub data: CostData,
}

impl CollectorOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self.status, OutcomeStatus::Failed(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionReport {
    pub outcomes: Vec<CollectorOutcome>,
}

impl CollectionReport {
    /// Sum of `total_cost` over collectors that count toward totals.
    pub fn combined_total(&self) -> f64 {
        let sum = self
            .counted()
            .map(|o| from_f64(o.data.total_cost))
            .fold(Decimal::ZERO, Decimal::saturating_add);
        round_total(sum)
    }

    /// Per-service costs across counted collectors. Labels are namespaced
    /// per provider, so a shared key only arises from the same provider.
    pub fn merged_cost_by_service(&self) -> BTreeMap<String, f64> {
        let mut merged: BTreeMap<String, Decimal> = BTreeMap::new();
        for outcome in self.counted() {
            for (label, cost) in &outcome.data.cost_by_service {
                let entry = merged.entry(label.clone()).or_insert(Decimal::ZERO);
                *entry = entry.saturating_add(from_f64(*cost));
            }
        }
        merged
            .into_iter()
            .map(|(label, cost)| (label, to_f64(cost)))
            .collect()
    }

    pub fn degraded_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_degraded()).count()
    }

    fn counted(&self) -> impl Iterator<Item = &CollectorOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.kind.counts_toward_total())
    }
}

/// Run every collector in its own task and gather the outcomes in input
/// order. Each collector is closed once its `collect()` returns.
pub async fn collect_all(
    collectors: Vec<(CollectorKind, Box<dyn Collector>)>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    deadline: Option<Duration>,
) -> CollectionReport {
    let deadline = deadline.map(|d| Instant::now() + d);
    let period = CollectionPeriod::resolve(start, end, Utc::now().date_naive());

    let handles: Vec<_> = collectors
        .into_iter()
        .map(|(kind, collector)| {
            let name = collector.collector_name();
            let handle = tokio::spawn(async move {
                let data = collector.collect(start, end).await;
                collector.close();
                data
            });
            (kind, name, handle)
        })
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for (kind, name, mut handle) in handles {
        let joined = match deadline {
            Some(at) => match timeout_at(at, &mut handle).await {
                Ok(joined) => joined.map_err(|e| e.to_string()),
                Err(_) => {
                    handle.abort();
                    Err(DEADLINE_EXCEEDED.to_string())
                }
            },
            None => handle.await.map_err(|e| e.to_string()),
        };

        let outcome = match joined {
            Ok(data) => {
                info!(collector = name, total = data.total_cost, trend = %data.trend, "Collector finished");
                CollectorOutcome {
                    collector: name,
                    kind,
                    status: OutcomeStatus::Ok,
                    data,
                }
            }
            Err(reason) => {
                if reason == DEADLINE_EXCEEDED {
                    warn!(collector = name, "Collector missed the run deadline");
                } else {
                    error!(collector = name, %reason, "Collector task failed");
                }
                CollectorOutcome {
                    collector: name,
                    kind,
                    data: CostData::degraded(name, period.start, period.end, Utc::now()),
                    status: OutcomeStatus::Failed(reason),
                }
            }
        };
        outcomes.push(outcome);
    }

    CollectionReport { outcomes }
}
