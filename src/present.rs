//! Shapes an [`AggregateResult`] into the six dashboard surfaces.
//!
//! Every surface keeps the raw numbers next to their display text; formatting
//! only ever touches the text.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{AggregateResult, ClusterId, CorrelationMatrix, Kpis, Metric};

/// Shown wherever a value is undefined.
pub const UNDEFINED: &str = "n/a";
pub const HEATMAP_COLORSCALE: &str = "Viridis";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiCard {
    pub title: &'static str,
    pub display: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    pub cluster: ClusterId,
    pub label: String,
    pub roi: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarChart {
    pub title: &'static str,
    pub x_label: &'static str,
    pub y_label: &'static str,
    pub bars: Vec<Bar>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineSeries {
    pub cluster: ClusterId,
    pub name: String,
    pub points: Vec<(NaiveDate, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineChart {
    pub title: &'static str,
    pub series: Vec<LineSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterMark {
    pub x: f64,
    pub y: f64,
    pub size: u64,
    pub cluster: ClusterId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterChart {
    pub title: &'static str,
    pub x_label: &'static str,
    pub y_label: &'static str,
    pub marks: Vec<ScatterMark>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heatmap {
    pub title: &'static str,
    pub x: Vec<&'static str>,
    pub y: Vec<&'static str>,
    pub z: Vec<Vec<Option<f64>>>,
    pub text: Vec<Vec<String>>,
    pub colorscale: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub cluster: ClusterId,
    pub roi: f64,
    pub ctr: f64,
    pub conversions: u64,
    pub campaign_spend: f64,
    pub display: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryTable {
    pub columns: Vec<&'static str>,
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub kpi_cards: Vec<KpiCard>,
    pub bar_chart: BarChart,
    pub line_chart: LineChart,
    pub scatter: ScatterChart,
    pub heatmap: Heatmap,
    pub table: SummaryTable,
}

pub fn present(result: &AggregateResult) -> DashboardView {
    DashboardView {
        kpi_cards: kpi_cards(&result.kpis),
        bar_chart: bar_chart(result),
        line_chart: line_chart(result),
        scatter: scatter_chart(result),
        heatmap: heatmap(&result.correlation),
        table: summary_table(result),
    }
}

pub fn kpi_cards(kpis: &Kpis) -> Vec<KpiCard> {
    vec![
        KpiCard {
            title: "Average ROI",
            display: format_percent(kpis.avg_roi),
            value: kpis.avg_roi,
        },
        KpiCard {
            title: "Average CTR",
            display: format_percent(kpis.avg_ctr),
            value: kpis.avg_ctr,
        },
        KpiCard {
            title: "Total Conversions",
            display: kpis
                .total_conversions
                .map(format_count)
                .unwrap_or_else(|| UNDEFINED.to_string()),
            value: kpis.total_conversions.map(|count| count as f64),
        },
        KpiCard {
            title: "Total Spend",
            display: kpis
                .total_spend
                .map(format_currency)
                .unwrap_or_else(|| UNDEFINED.to_string()),
            value: kpis.total_spend,
        },
    ]
}

pub fn bar_chart(result: &AggregateResult) -> BarChart {
    BarChart {
        title: "ROI by Cluster",
        x_label: "Cluster",
        y_label: "ROI",
        bars: result
            .cluster_means
            .iter()
            .map(|means| Bar {
                cluster: means.cluster,
                label: cluster_label(means.cluster),
                roi: means.roi,
            })
            .collect(),
    }
}

pub fn line_chart(result: &AggregateResult) -> LineChart {
    let mut by_cluster: BTreeMap<ClusterId, Vec<(NaiveDate, f64)>> = BTreeMap::new();
    for point in &result.trend {
        by_cluster
            .entry(point.cluster)
            .or_default()
            .push((point.date, point.roi));
    }

    LineChart {
        title: "ROI Trend Over Time",
        series: by_cluster
            .into_iter()
            .map(|(cluster, points)| LineSeries {
                cluster,
                name: cluster_label(cluster),
                points,
            })
            .collect(),
    }
}

pub fn scatter_chart(result: &AggregateResult) -> ScatterChart {
    ScatterChart {
        title: "ROI vs Campaign Spend",
        x_label: Metric::CampaignSpend.column(),
        y_label: Metric::Roi.column(),
        marks: result
            .points
            .iter()
            .map(|point| ScatterMark {
                x: point.campaign_spend,
                y: point.roi,
                size: point.conversions,
                cluster: point.cluster,
            })
            .collect(),
    }
}

pub fn heatmap(matrix: &CorrelationMatrix) -> Heatmap {
    let labels: Vec<&'static str> = matrix.metrics.iter().map(|m| m.column()).collect();
    let text: Vec<Vec<String>> = matrix
        .cells
        .iter()
        .map(|row| {
            row.iter()
                .map(|cell| match cell {
                    Some(value) => format!("{value:.2}"),
                    None => UNDEFINED.to_string(),
                })
                .collect()
        })
        .collect();

    Heatmap {
        title: "Correlation Heatmap",
        x: labels.clone(),
        y: labels,
        z: matrix.cells.clone(),
        text,
        colorscale: HEATMAP_COLORSCALE,
    }
}

pub fn summary_table(result: &AggregateResult) -> SummaryTable {
    SummaryTable {
        columns: vec!["Cluster", "ROI", "CTR", "Conversions", "Campaign_Spend"],
        rows: result
            .cluster_summary
            .iter()
            .map(|summary| TableRow {
                cluster: summary.cluster,
                roi: summary.avg_roi,
                ctr: summary.avg_ctr,
                conversions: summary.total_conversions,
                campaign_spend: summary.total_spend,
                display: vec![
                    summary.cluster.to_string(),
                    format_percent(Some(summary.avg_roi)),
                    format_percent(Some(summary.avg_ctr)),
                    format_count(summary.total_conversions),
                    format_currency(summary.total_spend),
                ],
            })
            .collect(),
    }
}

pub fn cluster_label(cluster: ClusterId) -> String {
    format!("Cluster {cluster}")
}

pub fn format_percent(value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{value:.2}%"),
        None => UNDEFINED.to_string(),
    }
}

pub fn format_count(count: u64) -> String {
    group_thousands(&count.to_string())
}

pub fn format_currency(amount: f64) -> String {
    let text = format!("{:.2}", amount.abs());
    let (whole, cents) = text.split_once('.').unwrap_or((text.as_str(), "00"));
    let sign = if amount < 0.0 { "-" } else { "" };
    format!("{sign}${}.{cents}", group_thousands(whole))
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
