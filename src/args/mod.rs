//! CLI argument types and parsing helpers.
mod cli;
mod defaults;
pub(crate) mod parsers;
mod types;

#[cfg(test)]
mod test_support;

pub use cli::SockmeArgs;
pub use types::{Bounds, OutputFormat, PositiveU64, PositiveUsize, WorkerMode};

pub(crate) use defaults::DEFAULT_CONFIG_FILES;
