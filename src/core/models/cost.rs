use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Direction of a daily cost series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
    Unknown,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Increasing => write!(f, "increasing"),
            Self::Decreasing => write!(f, "decreasing"),
            Self::Stable => write!(f, "stable"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCost {
    pub date: NaiveDate,
    /// Dollars, rounded to 4 decimal places
    pub cost: f64,
}

/// Forward-looking spend estimate, exactly as reported by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostForecast {
    pub total_cost: f64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// One collection result for one provider over one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostData {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub collection_timestamp: DateTime<Utc>,
    /// Account number, or the provider name for providers without accounts
    pub account_id: String,
    /// Dollars, rounded to 2 decimal places
    pub total_cost: f64,
    pub currency: String,
    pub cost_by_service: BTreeMap<String, f64>,
    /// Ascending by date, one entry per observed day
    pub daily_costs: Vec<DailyCost>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast: Option<CostForecast>,
    pub trend: Trend,
    pub average_daily_cost: f64,
}

pub const USD: &str = "USD";

impl CostData {
    /// The value a collector returns when its provider could not be read.
    pub fn degraded(
        account_id: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        collection_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            start_date,
            end_date,
            collection_timestamp,
            account_id: account_id.into(),
            total_cost: 0.0,
            currency: USD.to_string(),
            cost_by_service: BTreeMap::new(),
            daily_costs: Vec::new(),
            forecast: None,
            trend: Trend::Unknown,
            average_daily_cost: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_cost == 0.0 && self.cost_by_service.is_empty() && self.daily_costs.is_empty()
    }
}
