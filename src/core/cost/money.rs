//! Exact monetary arithmetic.
//!
//! Amounts are accumulated as [`Decimal`] and only become `f64` when a
//! [`crate::core::models::cost::CostData`] is assembled.

use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

use crate::core::collectors::CollectorError;

/// Line items below half a cent are noise.
pub const NEGLIGIBLE_COST: Decimal = Decimal::from_parts(5, 0, 0, false, 3);

/// Parse a provider amount that may arrive as a decimal string or a JSON number.
///
/// Missing and `null` amounts count as zero.
pub fn parse_amount(value: Option<&Value>) -> Result<Decimal, CollectorError> {
    match value {
        None | Some(Value::Null) => Ok(Decimal::ZERO),
        Some(Value::String(s)) => parse_decimal(s),
        Some(Value::Number(n)) => parse_decimal(&n.to_string()),
        Some(other) => Err(CollectorError::InvalidAmount(other.to_string())),
    }
}

/// Parse a decimal string, accepting scientific notation as a fallback.
pub fn parse_decimal(s: &str) -> Result<Decimal, CollectorError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Ok(Decimal::ZERO);
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| CollectorError::InvalidAmount(s.to_string()))
}

/// Sum of two amounts, or an error when it leaves the [`Decimal`] range.
pub fn add_amounts(acc: Decimal, amount: Decimal) -> Result<Decimal, CollectorError> {
    acc.checked_add(amount)
        .ok_or_else(|| CollectorError::InvalidAmount(format!("{acc} + {amount} overflows")))
}

pub fn cents_to_dollars(cents: Decimal) -> Decimal {
    cents / Decimal::ONE_HUNDRED
}

pub fn is_negligible(dollars: Decimal) -> bool {
    dollars < NEGLIGIBLE_COST
}

/// Totals are reported to the cent.
pub fn round_total(dollars: Decimal) -> f64 {
    to_f64(dollars.round_dp(2))
}

/// Daily values keep four places so small days survive later aggregation.
pub fn round_daily(dollars: Decimal) -> f64 {
    to_f64(dollars.round_dp(4))
}

/// Nearest `f64` to the decimal value.
///
/// Goes through the shortest decimal string, so the result prints back as
/// the same digits. `ToPrimitive::to_f64` can land one ulp off, which shows
/// up as `2.5049999999999999` in JSON output.
pub fn to_f64(dollars: Decimal) -> f64 {
    dollars
        .normalize()
        .to_string()
        .parse()
        .unwrap_or(0.0)
}

/// Back into exact arithmetic from an already-rounded output value.
pub fn from_f64(value: f64) -> Decimal {
    if !value.is_finite() {
        return Decimal::ZERO;
    }
    Decimal::from_str(&value.to_string()).unwrap_or(Decimal::ZERO)
}
