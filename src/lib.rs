pub mod aggregate;
pub mod config;
pub mod controller;
pub mod dataset;
pub mod filter;
pub mod input;
pub mod logging;
pub mod models;
pub mod present;
pub mod report;

pub use controller::{Controller, DashboardHandle, Snapshot};
pub use dataset::Dataset;
pub use models::{AggregateResult, FilterChange, FilterSpec, RegionSelection};
