use tracing::debug;

use crate::dataset::Dataset;
use crate::models::{FilterSpec, Record, RegionSelection};

/// Turns a filter spec into a row predicate. The date range is inclusive on
/// both ends, so an inverted range matches nothing.
pub fn build(spec: &FilterSpec) -> impl Fn(&Record) -> bool + '_ {
    move |record: &Record| {
        let in_range = spec.date_start <= record.date && record.date <= spec.date_end;
        let in_cluster = spec.clusters.is_empty() || spec.clusters.contains(&record.cluster);
        let in_region = match &spec.region {
            RegionSelection::All => true,
            RegionSelection::Only(region) => record.in_region(region),
        };
        in_range && in_cluster && in_region
    }
}

pub fn apply<'a>(dataset: &'a Dataset, spec: &FilterSpec) -> Vec<&'a Record> {
    let predicate = build(spec);
    let rows: Vec<&Record> = dataset
        .records()
        .iter()
        .filter(|record| predicate(*record))
        .collect();

    debug!(
        action = "filter",
        component = "filter",
        inverted_range = spec.is_inverted(),
        matched = rows.len(),
        total = dataset.len(),
        "Applied filter"
    );
    rows
}
