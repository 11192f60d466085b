//! Live learning metrics.
//!
//! A [`MetricsController`] combines an immediate full pull, push-triggered
//! targeted re-pulls and an interval fallback into one reconciled snapshot,
//! and smooths the displayed values toward it.

pub mod controller;
pub mod display;
pub mod ledger;
pub mod source;
pub mod triggers;
pub mod types;

pub use controller::{MetricsController, MetricsHandle, MetricsSettings, TeardownReport};
pub use display::Interpolation;
pub use ledger::{MetricUpdate, MetricsLedger, PullSeq};
pub use source::{BackendMetrics, MetricQueries, MetricsSource};
pub use triggers::{MetricTrigger, RowPredicate, default_triggers};
pub use types::{MetricKey, MetricSnapshot};
