mod app;
mod config;
mod metrics;
mod sink;
mod validation;
mod worker;

#[cfg(test)]
mod test_support;

pub use app::{AppError, AppResult};
pub use config::ConfigError;
pub use metrics::MetricsError;
pub use sink::SinkError;
pub use validation::{BoundsPart, ValidationError};
pub use worker::WorkerError;
