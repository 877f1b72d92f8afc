use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;

pub type ClusterId = i64;

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub date: NaiveDate,
    pub cluster: ClusterId,
    pub roi: f64,
    pub ctr: f64,
    pub conversions: u64,
    pub campaign_spend: f64,
    pub regions: BTreeMap<String, bool>,
}

impl Record {
    pub fn in_region(&self, region: &str) -> bool {
        self.regions.get(region).copied().unwrap_or(false)
    }

    pub fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Roi => self.roi,
            Metric::Ctr => self.ctr,
            Metric::Conversions => self.conversions as f64,
            Metric::CampaignSpend => self.campaign_spend,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Metric {
    Roi,
    Ctr,
    Conversions,
    CampaignSpend,
}

impl Metric {
    /// Axis order of the correlation matrix and heatmap.
    pub const ALL: [Metric; 4] = [
        Metric::Roi,
        Metric::Ctr,
        Metric::Conversions,
        Metric::CampaignSpend,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Metric::Roi => "ROI",
            Metric::Ctr => "CTR",
            Metric::Conversions => "Conversions",
            Metric::CampaignSpend => "Campaign_Spend",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionSelection {
    All,
    Only(String),
}

impl FromStr for RegionSelection {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("all") {
            Ok(RegionSelection::All)
        } else {
            Ok(RegionSelection::Only(value.to_string()))
        }
    }
}

impl fmt::Display for RegionSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionSelection::All => write!(f, "all"),
            RegionSelection::Only(region) => write!(f, "{region}"),
        }
    }
}

/// The complete set of filter selections behind one dashboard state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterSpec {
    pub date_start: NaiveDate,
    pub date_end: NaiveDate,
    /// Empty means every cluster.
    pub clusters: BTreeSet<ClusterId>,
    pub region: RegionSelection,
}

/// A single user edit to one of the filter inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterChange {
    DateRange(NaiveDate, NaiveDate),
    Clusters(BTreeSet<ClusterId>),
    Region(RegionSelection),
}

impl FilterSpec {
    pub fn apply(&mut self, change: FilterChange) {
        match change {
            FilterChange::DateRange(start, end) => {
                self.date_start = start;
                self.date_end = end;
            }
            FilterChange::Clusters(clusters) => self.clusters = clusters,
            FilterChange::Region(region) => self.region = region,
        }
    }

    pub fn is_inverted(&self) -> bool {
        self.date_start > self.date_end
    }
}

impl fmt::Display for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clusters = if self.clusters.is_empty() {
            "all clusters".to_string()
        } else {
            let ids: Vec<String> = self.clusters.iter().map(|id| id.to_string()).collect();
            format!("clusters {}", ids.join(", "))
        };
        write!(
            f,
            "{} to {}, {}, region {}",
            self.date_start, self.date_end, clusters, self.region
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpis {
    pub avg_roi: Option<f64>,
    pub avg_ctr: Option<f64>,
    pub total_conversions: Option<u64>,
    pub total_spend: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterMeans {
    pub cluster: ClusterId,
    pub rows: usize,
    pub roi: f64,
    pub ctr: f64,
    pub conversions: f64,
    pub campaign_spend: f64,
    /// Fraction of rows in the group with each region flag set.
    pub region_share: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub cluster: ClusterId,
    pub roi: f64,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub metrics: Vec<Metric>,
    pub cells: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn get(&self, row: Metric, col: Metric) -> Option<f64> {
        let i = self.metrics.iter().position(|m| *m == row)?;
        let j = self.metrics.iter().position(|m| *m == col)?;
        self.cells[i][j]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub cluster: ClusterId,
    pub rows: usize,
    pub avg_roi: f64,
    pub avg_ctr: f64,
    pub total_conversions: u64,
    pub total_spend: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub date: NaiveDate,
    pub cluster: ClusterId,
    pub campaign_spend: f64,
    pub roi: f64,
    pub conversions: u64,
}

/// Everything derived from one filtered row set. Always built fresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateResult {
    pub row_count: usize,
    pub kpis: Kpis,
    pub cluster_means: Vec<ClusterMeans>,
    pub trend: Vec<TrendPoint>,
    pub correlation: CorrelationMatrix,
    pub cluster_summary: Vec<ClusterSummary>,
    pub points: Vec<ScatterPoint>,
}
