use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::aggregator::{MetricSummary, RunReport};

#[derive(Tabled)]
struct MetricRow {
    metric: String,
    kind: String,
    value: String,
}

#[derive(Tabled)]
struct CheckRow {
    check: String,
    passes: u64,
    fails: u64,
}

#[derive(Tabled)]
struct ThresholdRow {
    metric: String,
    threshold: String,
    observed: String,
    verdict: String,
}

fn describe(summary: &MetricSummary) -> String {
    match summary {
        MetricSummary::Counter { count, per_second } => format!("{count} ({per_second:.2}/s)"),
        MetricSummary::Rate { passes, total } if *total > 0 => format!(
            "{:.2}% ({passes} of {total})",
            *passes as f64 / *total as f64 * 100.0
        ),
        MetricSummary::Rate { .. } => "no samples".to_string(),
        MetricSummary::Trend(Some(stats)) => format!(
            "avg={:.2} min={:.2} med={:.2} max={:.2} p(90)={:.2} p(95)={:.2} count={}",
            stats.avg, stats.min, stats.med, stats.max, stats.p90, stats.p95, stats.count
        ),
        MetricSummary::Trend(None) => "no samples".to_string(),
    }
}

/// Print the metrics, checks and thresholds of a finished run to stdout.
pub fn print_summary(report: &RunReport) {
    println!("\nSummary of metrics ({:.1}s)", report.elapsed.as_secs_f64());
    let rows = report
        .metrics
        .iter()
        .map(|(name, summary)| MetricRow {
            metric: name.clone(),
            kind: summary.kind().to_string(),
            value: describe(summary),
        })
        .collect::<Vec<_>>();
    let mut table = Table::new(rows);
    table.with(Style::modern());
    println!("{table}");

    if !report.checks.is_empty() {
        println!("\nChecks");
        let rows = report
            .checks
            .iter()
            .map(|(name, tally)| CheckRow {
                check: name.clone(),
                passes: tally.passes,
                fails: tally.fails,
            })
            .collect::<Vec<_>>();
        let mut table = Table::new(rows);
        table.with(Style::modern());
        println!("{table}");
    }

    if !report.thresholds.is_empty() {
        println!("\nThresholds");
        let rows = report
            .thresholds
            .iter()
            .map(|outcome| ThresholdRow {
                metric: outcome.metric.clone(),
                threshold: outcome.expression.clone(),
                observed: outcome
                    .observed
                    .map(|value| format!("{value:.3}"))
                    .unwrap_or_else(|| "-".to_string()),
                verdict: outcome.verdict.to_string(),
            })
            .collect::<Vec<_>>();
        let mut table = Table::new(rows);
        table.with(Style::modern());
        println!("{table}");
    }
}
