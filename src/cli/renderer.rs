use colored::{control, ColoredString, Colorize};

use crate::core::formatter::{format_cost_bar, format_sparkline, format_trend, format_usd};
use crate::core::models::cost::Trend;
use crate::core::orchestrator::{CollectionReport, CollectorOutcome, OutcomeStatus};

const BAR_WIDTH: usize = 12;
const MAX_SERVICES: usize = 8;

/// Render one collector result as a colored (or plain) string.
///
/// Layout:
/// ```text
///  Anthropic  2025-01-14 → 2025-01-15
///   Total     $16.51
///   Average   $11.00/day  ↑ increasing
///   History   ▁▁▃█ (4d)
///   Forecast  $321.99 through 2025-02-01
///   Services:
///     Claude::Opus tokens          $13.00 [█████████░░░]
/// ```
pub fn render_outcome(outcome: &CollectorOutcome, show_all: bool, use_color: bool) -> String {
    control::set_override(use_color);

    let data = &outcome.data;
    let mut lines: Vec<String> = Vec::new();

    let mut header = format!(" {}", outcome.kind.display_name());
    if data.account_id != outcome.collector {
        header.push_str(&format!(" ({})", data.account_id));
    }
    lines.push(format!(
        "{}  {}",
        header.bold(),
        format!("{} → {}", data.start_date, data.end_date).dimmed()
    ));

    if let OutcomeStatus::Failed(reason) = &outcome.status {
        lines.push(format!("  {}    {}", "Status".cyan(), format!("failed: {}", reason).red()));
        return lines.join("\n");
    }

    lines.push(format!("  {}     {}", "Total".cyan(), format_usd(data.total_cost).bold()));

    if !data.daily_costs.is_empty() {
        lines.push(format!(
            "  {}   {}/day  {}",
            "Average".cyan(),
            format_usd(data.average_daily_cost),
            color_trend(data.trend)
        ));
        lines.push(format!(
            "  {}   {} ({}d)",
            "History".cyan(),
            format_sparkline(&data.daily_costs).magenta(),
            data.daily_costs.len()
        ));
    }

    if let Some(forecast) = &data.forecast {
        lines.push(format!(
            "  {}  {} through {}",
            "Forecast".cyan(),
            format_usd(forecast.total_cost),
            forecast.end_date
        ));
    }

    if !data.cost_by_service.is_empty() {
        let mut services: Vec<(&String, &f64)> = data.cost_by_service.iter().collect();
        services.sort_by(|a, b| b.1.total_cmp(a.1).then_with(|| a.0.cmp(b.0)));
        let max = services.first().map(|(_, cost)| **cost).unwrap_or(0.0);
        let shown = if show_all { services.len() } else { MAX_SERVICES };

        lines.push(format!("  {}:", "Services".cyan()));
        for (label, cost) in services.iter().take(shown) {
            lines.push(format!(
                "    {:<28} {:>10} {}",
                label,
                format_usd(**cost),
                format_cost_bar(**cost, max, BAR_WIDTH).magenta()
            ));
        }
        if services.len() > shown {
            lines.push(format!(
                "    {}",
                format!("… {} more (use --all)", services.len() - shown).dimmed()
            ));
        }
    } else if data.total_cost == 0.0 {
        lines.push(format!("  {}", "No spend reported".dimmed()));
    }

    if show_all && !data.daily_costs.is_empty() {
        lines.push(format!("  {}:", "Daily".cyan()));
        for day in data.daily_costs.iter().rev() {
            lines.push(format!(
                "    {:<12} {}",
                day.date.format("%b %d"),
                format_usd(day.cost)
            ));
        }
    }

    lines.join("\n")
}

/// Cross-provider footer. Budgets are listed but not added in.
pub fn render_summary(report: &CollectionReport, use_color: bool) -> String {
    control::set_override(use_color);

    let mut line = format!(
        " {}  {}",
        "Combined".bold(),
        format_usd(report.combined_total()).bold()
    );
    let degraded = report.degraded_count();
    if degraded > 0 {
        line.push_str(&format!(
            "  {}",
            format!(
                "({} collector{} failed)",
                degraded,
                if degraded == 1 { "" } else { "s" }
            )
            .yellow()
        ));
    }
    line
}

fn color_trend(trend: Trend) -> ColoredString {
    let text = format_trend(trend);
    match trend {
        Trend::Increasing => text.red(),
        Trend::Decreasing => text.green(),
        Trend::Stable => text.normal(),
        Trend::Unknown => text.dimmed(),
    }
}
