//! Client-side analytics capture with periodic batched inserts.

pub mod queue;

pub use queue::{AnalyticsEvent, AnalyticsFlusher, AnalyticsQueue};
