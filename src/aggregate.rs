use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::models::{
    AggregateResult, ClusterId, ClusterMeans, ClusterSummary, CorrelationMatrix, Kpis, Metric,
    Record, ScatterPoint, TrendPoint,
};

#[derive(Default)]
struct GroupTotals {
    rows: usize,
    roi: f64,
    ctr: f64,
    conversions: u64,
    campaign_spend: f64,
    region_hits: BTreeMap<String, usize>,
}

impl GroupTotals {
    fn add(&mut self, record: &Record) {
        self.rows += 1;
        self.roi += record.roi;
        self.ctr += record.ctr;
        self.conversions = self.conversions.saturating_add(record.conversions);
        self.campaign_spend += record.campaign_spend;
        for (region, flag) in &record.regions {
            let hits = self.region_hits.entry(region.clone()).or_insert(0);
            if *flag {
                *hits += 1;
            }
        }
    }
}

fn mean(total: f64, count: usize) -> Option<f64> {
    if count == 0 {
        None
    } else {
        Some(total / count as f64)
    }
}

pub fn aggregate(rows: &[&Record]) -> AggregateResult {
    let mut overall = GroupTotals::default();
    let mut by_cluster: BTreeMap<ClusterId, GroupTotals> = BTreeMap::new();
    let mut by_day: BTreeMap<(NaiveDate, ClusterId), (f64, usize)> = BTreeMap::new();

    for record in rows {
        overall.add(record);
        by_cluster.entry(record.cluster).or_default().add(record);
        let entry = by_day.entry((record.date, record.cluster)).or_insert((0.0, 0));
        entry.0 += record.roi;
        entry.1 += 1;
    }

    let kpis = Kpis {
        avg_roi: mean(overall.roi, overall.rows),
        avg_ctr: mean(overall.ctr, overall.rows),
        total_conversions: (overall.rows > 0).then_some(overall.conversions),
        total_spend: (overall.rows > 0).then_some(overall.campaign_spend),
    };

    let cluster_means = by_cluster
        .iter()
        .map(|(cluster, totals)| {
            let n = totals.rows as f64;
            ClusterMeans {
                cluster: *cluster,
                rows: totals.rows,
                roi: totals.roi / n,
                ctr: totals.ctr / n,
                conversions: totals.conversions as f64 / n,
                campaign_spend: totals.campaign_spend / n,
                region_share: totals
                    .region_hits
                    .iter()
                    .map(|(region, hits)| (region.clone(), *hits as f64 / n))
                    .collect(),
            }
        })
        .collect();

    let cluster_summary = by_cluster
        .iter()
        .map(|(cluster, totals)| {
            let n = totals.rows as f64;
            ClusterSummary {
                cluster: *cluster,
                rows: totals.rows,
                avg_roi: totals.roi / n,
                avg_ctr: totals.ctr / n,
                total_conversions: totals.conversions,
                total_spend: totals.campaign_spend,
            }
        })
        .collect();

    // BTreeMap iteration gives (date, cluster) ascending, which the line chart relies on.
    let trend = by_day
        .into_iter()
        .map(|((date, cluster), (roi, count))| TrendPoint {
            date,
            cluster,
            roi: roi / count as f64,
            rows: count,
        })
        .collect();

    let points = rows
        .iter()
        .map(|record| ScatterPoint {
            date: record.date,
            cluster: record.cluster,
            campaign_spend: record.campaign_spend,
            roi: record.roi,
            conversions: record.conversions,
        })
        .collect();

    AggregateResult {
        row_count: rows.len(),
        kpis,
        cluster_means,
        trend,
        correlation: correlation(rows),
        cluster_summary,
        points,
    }
}

/// Pairwise Pearson correlation over [`Metric::ALL`]. A column with fewer
/// than two values or no variance is undefined everywhere, diagonal included.
pub fn correlation(rows: &[&Record]) -> CorrelationMatrix {
    let columns: Vec<Vec<f64>> = Metric::ALL
        .iter()
        .map(|metric| rows.iter().map(|r| r.metric(*metric)).collect())
        .collect();
    let varies: Vec<bool> = columns.iter().map(|c| has_variance(c)).collect();

    let size = Metric::ALL.len();
    let mut cells = vec![vec![None; size]; size];
    for i in 0..size {
        if !varies[i] {
            continue;
        }
        cells[i][i] = Some(1.0);
        for j in (i + 1)..size {
            if !varies[j] {
                continue;
            }
            let r = pearson(&columns[i], &columns[j]);
            cells[i][j] = r;
            cells[j][i] = r;
        }
    }

    CorrelationMatrix {
        metrics: Metric::ALL.to_vec(),
        cells,
    }
}

fn has_variance(values: &[f64]) -> bool {
    match values.first() {
        Some(first) if values.len() >= 2 => values.iter().any(|v| v != first),
        _ => false,
    }
}

fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    let r = sxy / (sxx.sqrt() * syy.sqrt());
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, day).unwrap()
    }

    fn record(day: u32, cluster: ClusterId, roi: f64, conversions: u64, spend: f64) -> Record {
        Record {
            date: date(day),
            cluster,
            roi,
            ctr: roi / 10.0 + day as f64 * 0.01,
            conversions,
            campaign_spend: spend,
            regions: BTreeMap::from([("region_1".to_string(), cluster == 0)]),
        }
    }

    fn sample() -> Vec<Record> {
        vec![
            record(1, 1, 20.0, 5, 100.0),
            record(1, 0, 10.0, 3, 50.0),
            record(2, 1, 30.0, 8, 120.0),
            record(3, 0, 14.0, 4, 70.0),
            record(3, 0, 18.0, 6, 90.0),
        ]
    }

    #[test]
    fn kpis_cover_every_row() {
        let records = sample();
        let rows: Vec<&Record> = records.iter().collect();
        let result = aggregate(&rows);

        assert_eq!(result.row_count, 5);
        assert_eq!(result.kpis.avg_roi, Some(92.0 / 5.0));
        assert_eq!(result.kpis.total_conversions, Some(26));
        assert_eq!(result.kpis.total_spend, Some(430.0));
        assert!(result.kpis.avg_ctr.is_some());
    }

    #[test]
    fn cluster_tables_have_one_sorted_row_per_cluster() {
        let records = sample();
        let rows: Vec<&Record> = records.iter().collect();
        let result = aggregate(&rows);

        let mean_ids: Vec<ClusterId> = result.cluster_means.iter().map(|m| m.cluster).collect();
        let summary_ids: Vec<ClusterId> =
            result.cluster_summary.iter().map(|s| s.cluster).collect();
        assert_eq!(mean_ids, vec![0, 1]);
        assert_eq!(summary_ids, vec![0, 1]);

        let zero = &result.cluster_means[0];
        assert_eq!(zero.rows, 3);
        assert_eq!(zero.roi, 14.0);
        assert_eq!(zero.conversions, 13.0 / 3.0);
        assert_eq!(zero.region_share.get("region_1"), Some(&1.0));

        let one = &result.cluster_summary[1];
        assert_eq!(one.avg_roi, 25.0);
        assert_eq!(one.total_conversions, 13);
        assert_eq!(one.total_spend, 220.0);
    }

    #[test]
    fn trend_is_ordered_by_date_then_cluster() {
        let records = sample();
        let rows: Vec<&Record> = records.iter().collect();
        let trend = aggregate(&rows).trend;

        let keys: Vec<(NaiveDate, ClusterId)> = trend.iter().map(|p| (p.date, p.cluster)).collect();
        assert_eq!(
            keys,
            vec![(date(1), 0), (date(1), 1), (date(2), 1), (date(3), 0)]
        );
        assert_eq!(trend[3].roi, 16.0);
        assert_eq!(trend[3].rows, 2);
    }

    #[test]
    fn correlation_is_symmetric_with_unit_diagonal() {
        let records = sample();
        let rows: Vec<&Record> = records.iter().collect();
        let matrix = correlation(&rows);

        for (i, row) in matrix.cells.iter().enumerate() {
            assert_eq!(row[i], Some(1.0));
            for (j, cell) in row.iter().enumerate() {
                assert_eq!(*cell, matrix.cells[j][i]);
                let value = cell.unwrap();
                assert!((-1.0..=1.0).contains(&value));
            }
        }
        let roi_spend = matrix.get(Metric::Roi, Metric::CampaignSpend).unwrap();
        assert!(roi_spend > 0.9);
    }

    #[test]
    fn perfectly_linear_columns_correlate_to_one() {
        let records: Vec<Record> = (1..=4)
            .map(|day| record(day, 0, day as f64 * 2.0, day as u64, day as f64 * 10.0))
            .collect();
        let rows: Vec<&Record> = records.iter().collect();
        let matrix = correlation(&rows);
        let value = matrix.get(Metric::Conversions, Metric::CampaignSpend).unwrap();
        assert!((value - 1.0).abs() < 1e-12);
    }

    #[test]
    fn constant_column_is_undefined() {
        let records = vec![record(1, 0, 10.0, 3, 50.0), record(2, 0, 12.0, 3, 60.0)];
        let rows: Vec<&Record> = records.iter().collect();
        let matrix = correlation(&rows);

        assert_eq!(matrix.get(Metric::Conversions, Metric::Conversions), None);
        assert_eq!(matrix.get(Metric::Roi, Metric::Conversions), None);
        assert_eq!(matrix.get(Metric::Roi, Metric::Roi), Some(1.0));
    }

    #[test]
    fn single_row_correlation_is_undefined() {
        let records = vec![record(1, 0, 10.0, 3, 50.0)];
        let rows: Vec<&Record> = records.iter().collect();
        let matrix = correlation(&rows);
        assert!(matrix.cells.iter().flatten().all(Option::is_none));
    }

    #[test]
    fn empty_input_yields_undefined_outputs() {
        let result = aggregate(&[]);
        assert_eq!(result.row_count, 0);
        assert_eq!(result.kpis.avg_roi, None);
        assert_eq!(result.kpis.avg_ctr, None);
        assert_eq!(result.kpis.total_conversions, None);
        assert_eq!(result.kpis.total_spend, None);
        assert!(result.cluster_means.is_empty());
        assert!(result.trend.is_empty());
        assert!(result.cluster_summary.is_empty());
        assert!(result.points.is_empty());
        assert_eq!(result.correlation.cells.len(), 4);
        assert!(result.correlation.cells.iter().flatten().all(Option::is_none));
    }

    #[test]
    fn huge_conversion_totals_saturate() {
        let records = vec![
            record(1, 0, 10.0, 10_000_000_000_000_000_000, 50.0),
            record(2, 0, 12.0, 10_000_000_000_000_000_000, 60.0),
        ];
        let rows: Vec<&Record> = records.iter().collect();
        let result = aggregate(&rows);

        assert_eq!(result.kpis.total_conversions, Some(u64::MAX));
        assert_eq!(result.cluster_summary[0].total_conversions, u64::MAX);
    }

    #[test]
    fn aggregation_is_deterministic() {
        let records = sample();
        let rows: Vec<&Record> = records.iter().collect();
        assert_eq!(aggregate(&rows), aggregate(&rows));
    }
}
