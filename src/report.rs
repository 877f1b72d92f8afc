use std::fmt::Write;

use crate::models::FilterSpec;
use crate::present::{format_percent, DashboardView, UNDEFINED};

pub fn render_kpis(output: &mut String, view: &DashboardView) {
    let _ = writeln!(output, "## Key Metrics");
    for card in &view.kpi_cards {
        let _ = writeln!(output, "- {}: {}", card.title, card.display);
    }
}

pub fn render_table(output: &mut String, view: &DashboardView) {
    let _ = writeln!(output, "## Cluster Summary");

    if view.table.rows.is_empty() {
        let _ = writeln!(output, "No rows match the current filters.");
        return;
    }

    let _ = writeln!(output, "| {} |", view.table.columns.join(" | "));
    let _ = writeln!(output, "|{}", "---|".repeat(view.table.columns.len()));
    for row in &view.table.rows {
        let _ = writeln!(output, "| {} |", row.display.join(" | "));
    }
}

pub fn build_summary(spec: &FilterSpec, view: &DashboardView) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# Campaign ROI Summary");
    let _ = writeln!(output, "Filters: {spec}");
    let _ = writeln!(output);
    render_kpis(&mut output, view);
    let _ = writeln!(output);
    render_table(&mut output, view);
    output
}

pub fn build_report(spec: &FilterSpec, row_count: usize, view: &DashboardView) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Campaign ROI Dashboard Report");
    let _ = writeln!(output, "Generated for {spec} ({row_count} matching rows)");
    let _ = writeln!(output);
    render_kpis(&mut output, view);

    let _ = writeln!(output);
    let _ = writeln!(output, "## {}", view.bar_chart.title);
    if view.bar_chart.bars.is_empty() {
        let _ = writeln!(output, "No clusters in this window.");
    } else {
        for bar in &view.bar_chart.bars {
            let _ = writeln!(output, "- {}: {}", bar.label, format_percent(Some(bar.roi)));
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## {}", view.line_chart.title);
    if view.line_chart.series.is_empty() {
        let _ = writeln!(output, "No trend points in this window.");
    } else {
        let mut rows: Vec<_> = view
            .line_chart
            .series
            .iter()
            .flat_map(|series| {
                series
                    .points
                    .iter()
                    .map(move |(date, roi)| (*date, series.cluster, &series.name, *roi))
            })
            .collect();
        rows.sort_by_key(|(date, cluster, _, _)| (*date, *cluster));

        let _ = writeln!(output, "| Date | Cluster | ROI |");
        let _ = writeln!(output, "|---|---|---|");
        for (date, _, name, roi) in rows {
            let _ = writeln!(output, "| {} | {} | {} |", date, name, format_percent(Some(roi)));
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## {}", view.scatter.title);
    let _ = writeln!(
        output,
        "{} campaigns plotted ({} vs {}).",
        view.scatter.marks.len(),
        view.scatter.y_label,
        view.scatter.x_label
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## {}", view.heatmap.title);
    let _ = writeln!(output, "| | {} |", view.heatmap.x.join(" | "));
    let _ = writeln!(output, "|---|{}", "---|".repeat(view.heatmap.x.len()));
    for (label, row) in view.heatmap.y.iter().zip(&view.heatmap.text) {
        let _ = writeln!(output, "| {} | {} |", label, row.join(" | "));
    }
    if view.heatmap.z.iter().flatten().all(Option::is_none) {
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "Correlations are {UNDEFINED}: at least two rows with varying values are needed."
        );
    }

    let _ = writeln!(output);
    render_table(&mut output, view);

    output
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use chrono::NaiveDate;

    use super::*;
    use crate::aggregate::aggregate;
    use crate::models::{Record, RegionSelection};
    use crate::present::present;

    fn spec() -> FilterSpec {
        FilterSpec {
            date_start: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            date_end: NaiveDate::from_ymd_opt(2023, 1, 5).unwrap(),
            clusters: BTreeSet::new(),
            region: RegionSelection::All,
        }
    }

    #[test]
    fn report_lists_every_section() {
        let records: Vec<Record> = (1..=3)
            .map(|day| Record {
                date: NaiveDate::from_ymd_opt(2023, 1, day).unwrap(),
                cluster: (day % 2) as i64,
                roi: 10.0 * day as f64,
                ctr: 1.0 + day as f64,
                conversions: 2_000 * day as u64,
                campaign_spend: 100.0 + day as f64,
                regions: BTreeMap::new(),
            })
            .collect();
        let rows: Vec<&Record> = records.iter().collect();
        let view = present(&aggregate(&rows));
        let report = build_report(&spec(), rows.len(), &view);

        assert!(report.contains("Generated for 2023-01-01 to 2023-01-05, all clusters, region all (3 matching rows)"));
        assert!(report.contains("- Total Conversions: 12,000"));
        assert!(report.contains("## ROI by Cluster"));
        assert!(report.contains("- Cluster 0: 20.00%"));
        let trend_rows: Vec<&str> = report
            .lines()
            .filter(|line| line.starts_with("| 2023-"))
            .collect();
        assert_eq!(
            trend_rows,
            vec![
                "| 2023-01-01 | Cluster 1 | 10.00% |",
                "| 2023-01-02 | Cluster 0 | 20.00% |",
                "| 2023-01-03 | Cluster 1 | 30.00% |",
            ]
        );
        assert!(report.contains("| ROI | 1.00 |"));
        assert!(report.contains("| 1 | 20.00% |"));
    }

    #[test]
    fn empty_report_says_so() {
        let view = present(&aggregate(&[]));
        let report = build_report(&spec(), 0, &view);

        assert!(report.contains("- Average ROI: n/a"));
        assert!(report.contains("No clusters in this window."));
        assert!(report.contains("No trend points in this window."));
        assert!(report.contains("Correlations are n/a"));
        assert!(report.contains("No rows match the current filters."));
    }

    #[test]
    fn summary_contains_kpis_and_table() {
        let view = present(&aggregate(&[]));
        let summary = build_summary(&spec(), &view);
        assert!(summary.starts_with("# Campaign ROI Summary"));
        assert!(summary.contains("## Key Metrics"));
        assert!(summary.contains("## Cluster Summary"));
    }
}
