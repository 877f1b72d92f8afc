//! Recompute-on-change wiring between filter inputs and the dashboard.
//!
//! Each published [`Snapshot`] carries the spec, the aggregates and the view
//! built from them, so consumers never observe a mix of two updates. A
//! computation that was overtaken by a newer input is dropped rather than
//! published.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::aggregate::aggregate;
use crate::dataset::Dataset;
use crate::filter;
use crate::models::{AggregateResult, ClusterId, FilterChange, FilterSpec, RegionSelection};
use crate::present::{present, DashboardView};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub generation: u64,
    pub spec: FilterSpec,
    pub aggregate: AggregateResult,
    pub view: DashboardView,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Computing,
}

/// Full date range, first cluster in file order, every region.
pub fn default_spec(dataset: &Dataset) -> FilterSpec {
    let (date_start, date_end) = dataset
        .date_bounds()
        .unwrap_or((dataset.epoch(), dataset.epoch()));
    FilterSpec {
        date_start,
        date_end,
        clusters: dataset.clusters().first().copied().into_iter().collect(),
        region: RegionSelection::All,
    }
}

pub fn compute(dataset: &Dataset, spec: &FilterSpec) -> (AggregateResult, DashboardView) {
    let rows = filter::apply(dataset, spec);
    let result = aggregate(&rows);
    let view = present(&result);
    (result, view)
}

fn build_snapshot(dataset: &Dataset, spec: FilterSpec, generation: u64) -> Snapshot {
    let start_time = Instant::now();
    let (aggregate, view) = compute(dataset, &spec);
    debug!(
        action = "computed",
        component = "controller",
        generation,
        rows = aggregate.row_count,
        duration_ms = start_time.elapsed().as_millis(),
        "Recomputed dashboard"
    );
    Snapshot {
        generation,
        spec,
        aggregate,
        view,
    }
}

/// A pending recompute for one generation of the filter inputs.
#[derive(Debug, Clone)]
pub struct Ticket {
    pub generation: u64,
    pub spec: FilterSpec,
}

impl Ticket {
    pub fn run(self, dataset: &Dataset) -> Snapshot {
        build_snapshot(dataset, self.spec, self.generation)
    }
}

pub struct Controller {
    dataset: Arc<Dataset>,
    spec: FilterSpec,
    state: ControllerState,
    requested: u64,
    published: Arc<Snapshot>,
}

impl Controller {
    pub fn new(dataset: Arc<Dataset>) -> Self {
        let spec = default_spec(&dataset);
        Self::with_spec(dataset, spec)
    }

    pub fn with_spec(dataset: Arc<Dataset>, spec: FilterSpec) -> Self {
        let published = Arc::new(build_snapshot(&dataset, spec.clone(), 0));
        Self {
            dataset,
            spec,
            state: ControllerState::Idle,
            requested: 0,
            published,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn spec(&self) -> &FilterSpec {
        &self.spec
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.published)
    }

    /// Records an input change and hands out the work for it. Any ticket
    /// issued earlier becomes stale.
    pub fn begin(&mut self, change: FilterChange) -> Ticket {
        self.spec.apply(change);
        self.requested += 1;
        self.state = ControllerState::Computing;
        Ticket {
            generation: self.requested,
            spec: self.spec.clone(),
        }
    }

    /// Publishes a finished computation unless a newer input has arrived
    /// since its ticket was issued. Returns whether it was published.
    pub fn publish(&mut self, snapshot: Snapshot) -> bool {
        if snapshot.generation != self.requested {
            debug!(
                action = "discard",
                component = "controller",
                generation = snapshot.generation,
                latest = self.requested,
                "Dropped superseded result"
            );
            return false;
        }
        self.published = Arc::new(snapshot);
        self.state = ControllerState::Idle;
        true
    }

    pub fn apply(&mut self, change: FilterChange) -> Arc<Snapshot> {
        let ticket = self.begin(change);
        let snapshot = ticket.run(&self.dataset);
        self.publish(snapshot);
        self.snapshot()
    }
}

/// Inputs and outputs of a controller running on the tokio runtime.
pub struct DashboardHandle {
    inputs: watch::Sender<FilterSpec>,
    outputs: watch::Receiver<Arc<Snapshot>>,
    task: JoinHandle<()>,
}

impl DashboardHandle {
    pub fn update(&self, change: FilterChange) {
        self.inputs.send_modify(|spec| spec.apply(change));
    }

    pub fn spec(&self) -> FilterSpec {
        self.inputs.borrow().clone()
    }

    pub fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.outputs.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.outputs.clone()
    }

    pub async fn shutdown(self) {
        drop(self.inputs);
        if let Err(err) = self.task.await {
            error!(action = "shutdown", component = "controller", error = %err, "Controller task failed");
        }
    }
}

/// Starts the recompute loop. The first snapshot is computed before this
/// returns, so subscribers always see a valid dashboard.
pub fn spawn(dataset: Arc<Dataset>, spec: FilterSpec) -> DashboardHandle {
    spawn_with(dataset, spec, build_snapshot)
}

fn spawn_with<F>(dataset: Arc<Dataset>, spec: FilterSpec, recompute: F) -> DashboardHandle
where
    F: Fn(&Dataset, FilterSpec, u64) -> Snapshot + Send + Sync + 'static,
{
    let initial = Arc::new(build_snapshot(&dataset, spec.clone(), 0));
    let recompute = Arc::new(recompute);
    let (inputs, mut input_rx) = watch::channel(spec);
    let (output_tx, outputs) = watch::channel(initial);

    let task = tokio::spawn(async move {
        let mut generation = 0u64;
        while input_rx.changed().await.is_ok() {
            let spec = input_rx.borrow_and_update().clone();
            generation += 1;

            let worker_dataset = Arc::clone(&dataset);
            let worker = Arc::clone(&recompute);
            let snapshot = match tokio::task::spawn_blocking(move || {
                worker(&worker_dataset, spec, generation)
            })
            .await
            {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    error!(action = "compute", component = "controller", generation, error = %err, "Recompute task failed");
                    continue;
                }
            };

            if input_rx.has_changed().unwrap_or(false) {
                debug!(
                    action = "discard",
                    component = "controller",
                    generation,
                    "Inputs changed during recompute"
                );
                continue;
            }

            if output_tx.send(Arc::new(snapshot)).is_err() {
                break;
            }
        }
        info!(action = "stopped", component = "controller", "Controller loop finished");
    });

    DashboardHandle {
        inputs,
        outputs,
        task,
    }
}

pub fn clusters_change(ids: impl IntoIterator<Item = ClusterId>) -> FilterChange {
    FilterChange::Clusters(ids.into_iter().collect::<BTreeSet<_>>())
}
