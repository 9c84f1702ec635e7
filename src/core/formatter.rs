use crate::core::models::cost::{DailyCost, Trend};

/// Returns "$1,234.56": two decimals with thousands separators.
pub fn format_usd(amount: f64) -> String {
    let negative = amount < 0.0;
    let fixed = format!("{:.2}", amount.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if negative {
        format!("-${}.{}", grouped, cents)
    } else {
        format!("${}.{}", grouped, cents)
    }
}

/// Returns "↑ increasing", "↓ decreasing", "→ stable" or "? unknown".
pub fn format_trend(trend: Trend) -> String {
    let arrow = match trend {
        Trend::Increasing => "↑",
        Trend::Decreasing => "↓",
        Trend::Stable => "→",
        Trend::Unknown => "?",
    };
    format!("{} {}", arrow, trend)
}

/// Returns "[████████░░░░]" where █ is the share of `value` in `max`.
/// Width is the number of block characters inside the brackets.
pub fn format_cost_bar(value: f64, max: f64, width: usize) -> String {
    let ratio = if max > 0.0 {
        (value / max).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let filled_blocks = (ratio * width as f64).round() as usize;
    let empty_blocks = width.saturating_sub(filled_blocks);

    let filled: String = "█".repeat(filled_blocks);
    let empty: String = "░".repeat(empty_blocks);

    format!("[{}{}]", filled, empty)
}

/// One block character per day, scaled to the largest day.
pub fn format_sparkline(daily_costs: &[DailyCost]) -> String {
    const LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
    let max = daily_costs.iter().map(|d| d.cost).fold(0.0_f64, f64::max);
    daily_costs
        .iter()
        .map(|d| {
            if max <= 0.0 {
                return LEVELS[0];
            }
            let idx = ((d.cost / max) * (LEVELS.len() - 1) as f64).round() as usize;
            LEVELS[idx.min(LEVELS.len() - 1)]
        })
        .collect()
}
