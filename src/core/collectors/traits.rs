//! Collector capability and common types.

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate};
use thiserror::Error;

use crate::core::models::cost::CostData;

/// Errors raised while talking to a billing provider.
///
/// Only `Config` and `Auth` ever leave a collector, and only from its
/// constructor. Everything else is absorbed by `collect()`.
#[derive(Error, Debug)]
pub enum CollectorError {
    /// HTTP request failed (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider returned a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

/// A billing source that normalizes one provider into [`CostData`].
#[async_trait]
pub trait Collector: Send + Sync {
    /// Stable identifier used for logging, snapshot keys and report labels.
    fn collector_name(&self) -> &'static str;

    /// Collect costs for `[start_date, end_date)`.
    ///
    /// Defaults: `end_date` is today (UTC) and `start_date` the day before.
    /// Provider failures never escape: they are logged and turned into
    /// [`CostData::degraded`].
    async fn collect(&self, start_date: Option<NaiveDate>, end_date: Option<NaiveDate>)
        -> CostData;

    /// Release the collector. The HTTP client and its pooled connections are
    /// freed when the box drops at the end of this call; the default body
    /// only logs.
    fn close(self: Box<Self>) {
        tracing::debug!(collector = self.collector_name(), "Collector closed");
    }
}

/// Resolved collection period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl CollectionPeriod {
    pub fn resolve(start: Option<NaiveDate>, end: Option<NaiveDate>, today: NaiveDate) -> Self {
        let end = end.unwrap_or(today);
        let start = start.unwrap_or(end - Duration::days(1));
        Self { start, end }
    }

    /// Window for the snapshot totals. Never shorter than one day.
    pub fn snapshot_window(&self) -> (NaiveDate, NaiveDate) {
        if self.end > self.start {
            (self.start, self.end)
        } else {
            (self.start, self.start + Duration::days(1))
        }
    }

    /// Window for the daily trend series, ending at the period end.
    pub fn lookback_window(&self, lookback_days: u32) -> (NaiveDate, NaiveDate) {
        (self.end - Duration::days(i64::from(lookback_days)), self.end)
    }
}

/// First day of the month after `date`.
pub fn first_of_next_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date + Duration::days(1))
}
