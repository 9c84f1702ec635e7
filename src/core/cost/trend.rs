use crate::core::models::cost::{DailyCost, Trend};

/// Percent change between half-period averages that counts as movement.
const TREND_THRESHOLD_PERCENT: f64 = 10.0;

/// Classify a daily series by comparing the average of its first half with the
/// average of its second half. On odd lengths the first half is the shorter one.
pub fn calculate_trend(daily_costs: &[DailyCost]) -> Trend {
    if daily_costs.len() < 2 {
        return Trend::Unknown;
    }

    let mid = daily_costs.len() / 2;
    let (first, second) = daily_costs.split_at(mid);
    let first_avg = mean(first);
    let second_avg = mean(second);

    // No baseline to compare against.
    if first_avg == 0.0 {
        return Trend::Unknown;
    }

    let change_pct = (second_avg - first_avg) / first_avg * 100.0;
    if change_pct > TREND_THRESHOLD_PERCENT {
        Trend::Increasing
    } else if change_pct < -TREND_THRESHOLD_PERCENT {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}

fn mean(days: &[DailyCost]) -> f64 {
    if days.is_empty() {
        return 0.0;
    }
    days.iter().map(|d| d.cost).sum::<f64>() / days.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn series(costs: &[f64]) -> Vec<DailyCost> {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        costs
            .iter()
            .enumerate()
            .map(|(i, &cost)| DailyCost {
                date: start + Duration::days(i as i64),
                cost,
            })
            .collect()
    }

    #[test]
    fn fewer_than_two_points_is_unknown() {
        assert_eq!(calculate_trend(&[]), Trend::Unknown);
        assert_eq!(calculate_trend(&series(&[42.0])), Trend::Unknown);
    }

    #[test]
    fn zero_baseline_is_unknown() {
        assert_eq!(calculate_trend(&series(&[0.0, 5.0])), Trend::Unknown);
        assert_eq!(calculate_trend(&series(&[0.0, 0.0, 9.0, 9.0])), Trend::Unknown);
        assert_eq!(calculate_trend(&series(&[0.0, 0.0])), Trend::Unknown);
    }

    #[test]
    fn twenty_percent_rise_is_increasing() {
        assert_eq!(calculate_trend(&series(&[10.0, 10.0, 12.0, 12.0])), Trend::Increasing);
    }

    #[test]
    fn twenty_percent_drop_is_decreasing() {
        assert_eq!(calculate_trend(&series(&[10.0, 10.0, 8.0, 8.0])), Trend::Decreasing);
    }

    #[test]
    fn five_percent_change_is_stable() {
        assert_eq!(calculate_trend(&series(&[10.0, 10.0, 10.5, 10.5])), Trend::Stable);
    }

    #[test]
    fn exactly_ten_percent_is_stable() {
        assert_eq!(calculate_trend(&series(&[10.0, 11.0])), Trend::Stable);
    }

    #[test]
    fn odd_length_gives_first_half_the_smaller_share() {
        // first = [10], second = [10, 14] -> avg 12, +20%
        assert_eq!(calculate_trend(&series(&[10.0, 10.0, 14.0])), Trend::Increasing);
        // first = [10], second = [11, 11] -> +10%, not above threshold
        assert_eq!(calculate_trend(&series(&[10.0, 11.0, 11.0])), Trend::Stable);
    }
}
