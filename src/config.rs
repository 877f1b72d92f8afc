use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::Args;

use crate::controller::default_spec;
use crate::dataset::Dataset;
use crate::models::{ClusterId, FilterSpec, RegionSelection};

pub const DATASET_ENV: &str = "ROI_DASHBOARD_CSV";
pub const DEFAULT_EPOCH: &str = "2023-01-01";

pub fn resolve_dataset_path(flag: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match flag {
        Some(path) => Ok(path),
        None => std::env::var(DATASET_ENV)
            .map(PathBuf::from)
            .with_context(|| format!("pass --csv or set {DATASET_ENV} to the campaign dataset")),
    }
}

#[derive(Args, Debug, Clone)]
pub struct FilterArgs {
    /// First day to include (YYYY-MM-DD); defaults to the first dataset day
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last day to include (YYYY-MM-DD); defaults to the last dataset day
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Cluster to include, repeatable; defaults to the first cluster in the file
    #[arg(long = "cluster", conflicts_with = "all_clusters")]
    pub clusters: Vec<ClusterId>,

    /// Include every cluster
    #[arg(long)]
    pub all_clusters: bool,

    /// Region flag column to require, or "all"
    #[arg(long, default_value = "all")]
    pub region: String,
}

impl FilterArgs {
    pub fn resolve(&self, dataset: &Dataset) -> anyhow::Result<FilterSpec> {
        let mut spec = default_spec(dataset);

        if let Some(start) = self.start {
            spec.date_start = start;
        }
        if let Some(end) = self.end {
            spec.date_end = end;
        }
        if self.all_clusters {
            spec.clusters.clear();
        } else if !self.clusters.is_empty() {
            spec.clusters = validate_clusters(dataset, self.clusters.iter().copied())?;
        }
        spec.region = validate_region(dataset, &self.region)?;

        Ok(spec)
    }
}

pub fn validate_clusters(
    dataset: &Dataset,
    ids: impl IntoIterator<Item = ClusterId>,
) -> anyhow::Result<BTreeSet<ClusterId>> {
    let mut clusters = BTreeSet::new();
    for id in ids {
        if !dataset.clusters().contains(&id) {
            anyhow::bail!(
                "cluster {id} does not appear in the dataset (known: {:?})",
                dataset.clusters()
            );
        }
        clusters.insert(id);
    }
    Ok(clusters)
}

pub fn validate_region(dataset: &Dataset, value: &str) -> anyhow::Result<RegionSelection> {
    let region: RegionSelection = value.parse()?;
    if let RegionSelection::Only(name) = &region {
        if !dataset.has_region(name) {
            anyhow::bail!(
                "unknown region `{name}`; expected \"all\" or one of {:?}",
                dataset.regions()
            );
        }
    }
    Ok(region)
}
