use std::collections::BTreeMap;
use std::fmt;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::{ClusterId, Record};

pub const REQUIRED_COLUMNS: [&str; 5] = ["Cluster", "ROI", "CTR", "Conversions", "Campaign_Spend"];
pub const REGION_PREFIX: &str = "region_";
const MAX_CONVERSIONS: f64 = u64::MAX as f64;

#[derive(Debug)]
pub enum DatasetError {
    MissingColumn(&'static str),
    InvalidFlag {
        row: usize,
        column: String,
        value: String,
    },
    InvalidValue {
        row: usize,
        column: &'static str,
        value: f64,
    },
    Csv(csv::Error),
}

impl fmt::Display for DatasetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetError::MissingColumn(column) => {
                write!(f, "dataset is missing required column `{column}`")
            }
            DatasetError::InvalidFlag { row, column, value } => write!(
                f,
                "row {row}: region flag `{column}` has non-boolean value `{value}`"
            ),
            DatasetError::InvalidValue { row, column, value } => {
                write!(f, "row {row}: `{column}` has invalid value {value}")
            }
            DatasetError::Csv(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for DatasetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DatasetError::Csv(err) => Some(err),
            _ => None,
        }
    }
}

impl From<csv::Error> for DatasetError {
    fn from(err: csv::Error) -> Self {
        DatasetError::Csv(err)
    }
}

#[derive(Deserialize)]
struct CsvRow {
    #[serde(rename = "Cluster")]
    cluster: ClusterId,
    #[serde(rename = "ROI")]
    roi: f64,
    #[serde(rename = "CTR")]
    ctr: f64,
    #[serde(rename = "Conversions")]
    conversions: f64,
    #[serde(rename = "Campaign_Spend")]
    campaign_spend: f64,
}

/// The campaign table, loaded once and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct Dataset {
    records: Vec<Record>,
    clusters: Vec<ClusterId>,
    regions: Vec<String>,
    epoch: NaiveDate,
}

impl Dataset {
    pub fn load(path: &Path, epoch: NaiveDate) -> anyhow::Result<Self> {
        let start_time = Instant::now();
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open dataset {}", path.display()))?;
        let dataset = Self::from_reader(file, epoch)
            .with_context(|| format!("failed to load dataset {}", path.display()))?;

        info!(
            action = "loaded",
            component = "dataset",
            file_path = ?path,
            rows = dataset.len(),
            clusters = dataset.clusters.len(),
            regions = dataset.regions.len(),
            duration_ms = start_time.elapsed().as_millis(),
            "Loaded campaign dataset"
        );
        Ok(dataset)
    }

    /// Parses CSV and assigns row `i` the date `epoch + i days`.
    pub fn from_reader<R: Read>(reader: R, epoch: NaiveDate) -> Result<Self, DatasetError> {
        let mut reader = csv::Reader::from_reader(reader);
        let headers = reader.headers()?.clone();

        for column in REQUIRED_COLUMNS {
            if !headers.iter().any(|header| header == column) {
                return Err(DatasetError::MissingColumn(column));
            }
        }

        let region_columns: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(_, header)| header.starts_with(REGION_PREFIX))
            .map(|(index, header)| (index, header.to_string()))
            .collect();

        let mut records = Vec::new();
        for (index, result) in reader.records().enumerate() {
            let raw = result?;
            let row: CsvRow = raw.deserialize(Some(&headers))?;
            let line = index + 1;

            for (column, value) in [("ROI", row.roi), ("CTR", row.ctr)] {
                if !value.is_finite() {
                    return Err(DatasetError::InvalidValue {
                        row: line,
                        column,
                        value,
                    });
                }
            }
            // u64::MAX rounds up to 2^64 as f64, so that bound itself is out of range.
            if !(0.0..MAX_CONVERSIONS).contains(&row.conversions) || row.conversions.fract() != 0.0
            {
                return Err(DatasetError::InvalidValue {
                    row: line,
                    column: "Conversions",
                    value: row.conversions,
                });
            }
            if !row.campaign_spend.is_finite() || row.campaign_spend < 0.0 {
                return Err(DatasetError::InvalidValue {
                    row: line,
                    column: "Campaign_Spend",
                    value: row.campaign_spend,
                });
            }

            let mut regions = BTreeMap::new();
            for (column_index, name) in &region_columns {
                let value = raw.get(*column_index).unwrap_or_default();
                let flag = parse_flag(value).ok_or_else(|| DatasetError::InvalidFlag {
                    row: line,
                    column: name.clone(),
                    value: value.to_string(),
                })?;
                regions.insert(name.clone(), flag);
            }

            records.push(Record {
                date: epoch + Duration::days(index as i64),
                cluster: row.cluster,
                roi: row.roi,
                ctr: row.ctr,
                conversions: row.conversions as u64,
                campaign_spend: row.campaign_spend,
                regions,
            });
        }

        let regions = region_columns.into_iter().map(|(_, name)| name).collect();
        Ok(Self::assemble(records, regions, epoch))
    }

    /// Builds a dataset from records that already carry their dates.
    pub fn from_records(records: Vec<Record>, epoch: NaiveDate) -> Self {
        let mut regions: Vec<String> = Vec::new();
        for record in &records {
            for name in record.regions.keys() {
                if !regions.contains(name) {
                    regions.push(name.clone());
                }
            }
        }
        Self::assemble(records, regions, epoch)
    }

    fn assemble(records: Vec<Record>, regions: Vec<String>, epoch: NaiveDate) -> Self {
        let mut clusters = Vec::new();
        for record in &records {
            if !clusters.contains(&record.cluster) {
                clusters.push(record.cluster);
            }
        }
        Self {
            records,
            clusters,
            regions,
            epoch,
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn epoch(&self) -> NaiveDate {
        self.epoch
    }

    pub fn date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.records.iter().map(|r| r.date).min()?;
        let last = self.records.iter().map(|r| r.date).max()?;
        Some((first, last))
    }

    /// Distinct cluster ids in order of first appearance.
    pub fn clusters(&self) -> &[ClusterId] {
        &self.clusters
    }

    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    pub fn has_region(&self, name: &str) -> bool {
        self.regions.iter().any(|region| region == name)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "1.0" | "yes" => Some(true),
        "false" | "0" | "0.0" | "no" | "" => Some(false),
        _ => None,
    }
}

#[derive(Serialize)]
struct DemoRow {
    #[serde(rename = "Cluster")]
    cluster: ClusterId,
    #[serde(rename = "ROI")]
    roi: f64,
    #[serde(rename = "CTR")]
    ctr: f64,
    #[serde(rename = "Conversions")]
    conversions: u64,
    #[serde(rename = "Campaign_Spend")]
    campaign_spend: f64,
    region_1: bool,
    region_2: bool,
}

/// Writes a deterministic demo table with three clusters and two regions.
pub fn write_demo_csv<W: Write>(writer: W, rows: usize) -> anyhow::Result<usize> {
    let mut writer = csv::Writer::from_writer(writer);

    for i in 0..rows {
        let cluster = (i % 3) as ClusterId;
        let wobble = ((i * 37) % 100) as f64 / 100.0;
        let campaign_spend = 500.0 + 250.0 * cluster as f64 + 1_500.0 * wobble;
        let conversions = 10 + ((i * 13) % 90) as u64 + 20 * cluster as u64;
        let ctr = 1.5 + 0.8 * cluster as f64 + 2.0 * wobble;
        let roi = 40.0 + 35.0 * cluster as f64 + conversions as f64 * 0.9
            - campaign_spend / 100.0;

        writer.serialize(DemoRow {
            cluster,
            roi: (roi * 100.0).round() / 100.0,
            ctr: (ctr * 100.0).round() / 100.0,
            conversions,
            campaign_spend: (campaign_spend * 100.0).round() / 100.0,
            region_1: i % 2 == 0,
            region_2: i % 2 == 1,
        })?;
    }

    writer.flush().context("failed to flush demo dataset")?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
    }

    const SAMPLE: &str = "\
Campaign_ID,Cluster,ROI,CTR,Conversions,Campaign_Spend,region_1,region_2
a,1,12.5,2.0,10,100.0,True,False
b,0,8.0,1.5,4,50.5,False,True
c,1,20.0,3.5,7,80.0,1,0
";

    #[test]
    fn loads_rows_with_sequential_dates() {
        let dataset = Dataset::from_reader(SAMPLE.as_bytes(), epoch()).unwrap();
        assert_eq!(dataset.len(), 3);
        let dates: Vec<NaiveDate> = dataset.records().iter().map(|r| r.date).collect();
        assert_eq!(
            dates,
            vec![
                epoch(),
                NaiveDate::from_ymd_opt(2023, 1, 2).unwrap(),
                NaiveDate::from_ymd_opt(2023, 1, 3).unwrap(),
            ]
        );
        assert_eq!(dataset.clusters(), &[1, 0]);
        assert_eq!(dataset.regions(), &["region_1".to_string(), "region_2".to_string()]);
        assert!(dataset.records()[2].in_region("region_1"));
        assert!(!dataset.records()[2].in_region("region_2"));
        assert_eq!(dataset.records()[1].conversions, 4);
    }

    #[test]
    fn missing_required_column_is_fatal() {
        let csv = "Cluster,ROI,CTR,Conversions\n0,1.0,1.0,1\n";
        let err = Dataset::from_reader(csv.as_bytes(), epoch()).unwrap_err();
        assert!(matches!(err, DatasetError::MissingColumn("Campaign_Spend")));
    }

    #[test]
    fn rejects_non_boolean_region_flag() {
        let csv = "Cluster,ROI,CTR,Conversions,Campaign_Spend,region_1\n0,1,1,1,1,maybe\n";
        let err = Dataset::from_reader(csv.as_bytes(), epoch()).unwrap_err();
        assert!(matches!(err, DatasetError::InvalidFlag { row: 1, .. }));
    }

    #[test]
    fn rejects_fractional_conversions() {
        let csv = "Cluster,ROI,CTR,Conversions,Campaign_Spend\n0,1,1,2.5,1\n";
        let err = Dataset::from_reader(csv.as_bytes(), epoch()).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::InvalidValue {
                column: "Conversions",
                ..
            }
        ));
    }

    #[test]
    fn rejects_non_finite_metrics() {
        for (column, cells) in [
            ("ROI", "NaN,1,1,1"),
            ("ROI", "inf,1,1,1"),
            ("CTR", "1,NaN,1,1"),
            ("CTR", "1,-inf,1,1"),
            ("Campaign_Spend", "1,1,1,NaN"),
            ("Campaign_Spend", "1,1,1,inf"),
        ] {
            let csv = format!("Cluster,ROI,CTR,Conversions,Campaign_Spend\n0,{cells}\n");
            let err = Dataset::from_reader(csv.as_bytes(), epoch()).unwrap_err();
            assert!(
                matches!(err, DatasetError::InvalidValue { column: c, .. } if c == column),
                "{cells}: {err}"
            );
        }
    }

    #[test]
    fn rejects_conversions_beyond_u64() {
        let csv = "Cluster,ROI,CTR,Conversions,Campaign_Spend\n0,1,1,20000000000000000000,1\n";
        let err = Dataset::from_reader(csv.as_bytes(), epoch()).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::InvalidValue {
                column: "Conversions",
                ..
            }
        ));

        let csv = "Cluster,ROI,CTR,Conversions,Campaign_Spend\n0,1,1,10000000000000000000,1\n";
        let dataset = Dataset::from_reader(csv.as_bytes(), epoch()).unwrap();
        assert_eq!(dataset.records()[0].conversions, 10_000_000_000_000_000_000);
    }

    #[test]
    fn empty_table_is_valid() {
        let csv = "Cluster,ROI,CTR,Conversions,Campaign_Spend\n";
        let dataset = Dataset::from_reader(csv.as_bytes(), epoch()).unwrap();
        assert!(dataset.is_empty());
        assert_eq!(dataset.date_bounds(), None);
    }

    #[test]
    fn demo_dataset_loads_back() {
        let mut buffer = Vec::new();
        write_demo_csv(&mut buffer, 30).unwrap();
        let dataset = Dataset::from_reader(buffer.as_slice(), epoch()).unwrap();
        assert_eq!(dataset.len(), 30);
        assert_eq!(dataset.clusters(), &[0, 1, 2]);
        assert!(dataset.has_region("region_2"));
        assert_eq!(
            dataset.date_bounds(),
            Some((epoch(), NaiveDate::from_ymd_opt(2023, 1, 30).unwrap()))
        );
    }
}
