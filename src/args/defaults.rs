use std::num::NonZeroUsize;

use super::types::PositiveUsize;

/// Config filenames checked when `--config` is not given.
pub(crate) const DEFAULT_CONFIG_FILES: [&str; 2] = ["sockme.toml", "sockme.json"];

/// One worker per host CPU, falling back to a single worker when the count is unknown.
pub(crate) fn default_workers() -> PositiveUsize {
    let cpus = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
    PositiveUsize::try_from(cpus).unwrap_or(PositiveUsize::ONE)
}
