use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::core::collectors::CollectorError;
use crate::core::cost::money::{
    add_amounts, from_f64, is_negligible, round_daily, round_total, to_f64,
};
use crate::core::models::cost::DailyCost;

/// Per-service totals for a snapshot window.
///
/// Each line item is checked against the negligible floor on its own, before
/// it is added, so many tiny items never add up into a reported service.
/// Credits and refunds fall below the floor too: they never reduce the
/// snapshot total, which therefore stays non-negative.
#[derive(Debug, Default)]
pub struct ServiceTotals {
    by_service: BTreeMap<String, Decimal>,
    total: Decimal,
}

impl ServiceTotals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the item was kept. Fails without changing anything
    /// when the total would overflow.
    pub fn add(
        &mut self,
        label: impl Into<String>,
        dollars: Decimal,
    ) -> Result<bool, CollectorError> {
        if is_negligible(dollars) {
            return Ok(false);
        }
        let total = add_amounts(self.total, dollars)?;
        // Every kept item is positive, so a service never exceeds the total.
        let service = self.by_service.entry(label.into()).or_insert(Decimal::ZERO);
        *service = add_amounts(*service, dollars)?;
        self.total = total;
        Ok(true)
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    pub fn total_rounded(&self) -> f64 {
        round_total(self.total)
    }

    pub fn into_cost_by_service(self) -> BTreeMap<String, f64> {
        self.by_service
            .into_iter()
            .map(|(label, dollars)| (label, to_f64(dollars)))
            .collect()
    }
}

/// Per-day totals merged across pages.
///
/// Unlike [`ServiceTotals`], credits count here: they net against the
/// charges of the same day.
#[derive(Debug, Default)]
pub struct DailyTotals {
    days: BTreeMap<NaiveDate, Decimal>,
}

impl DailyTotals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, date: NaiveDate, dollars: Decimal) -> Result<(), CollectorError> {
        let day = self.days.entry(date).or_insert(Decimal::ZERO);
        *day = add_amounts(*day, dollars)?;
        Ok(())
    }

    /// One entry per day, ascending. Net credits never push a day below zero.
    pub fn into_daily_costs(self) -> Vec<DailyCost> {
        self.days
            .into_iter()
            .map(|(date, dollars)| DailyCost {
                date,
                cost: round_daily(dollars.max(Decimal::ZERO)),
            })
            .collect()
    }
}

/// Bucket date from a provider timestamp such as `2025-01-14T00:00:00Z`.
pub fn bucket_date(timestamp: &str) -> Option<NaiveDate> {
    let day = timestamp.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Mean of the daily values, to the cent. Zero when there are no days.
pub fn average_daily_cost(daily_costs: &[DailyCost]) -> f64 {
    if daily_costs.is_empty() {
        return 0.0;
    }
    // Dividing first keeps the running sum within range.
    let days = Decimal::from(daily_costs.len());
    let mean: Decimal = daily_costs.iter().map(|d| from_f64(d.cost) / days).sum();
    round_total(mean)
}
