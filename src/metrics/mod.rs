//! Run-wide event accounting.
mod collector;
mod histogram;
mod keys;
mod types;


pub use collector::RunMetrics;
pub use histogram::SizeHistogram;
pub use keys::metric_key;
pub use types::{ErrorCount, MetricsSummary, TrafficSummary};
