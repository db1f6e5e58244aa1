use clap::ArgMatches;
use clap::parser::ValueSource;

use crate::args::{PositiveU64, PositiveUsize, SockmeArgs};
use crate::error::{AppError, AppResult, ConfigError, ValidationError};

use super::types::{ConfigFile, DurationValue};

/// Applies configuration values to CLI arguments. Values given explicitly on the
/// command line always win over the file.
///
/// # Errors
///
/// Returns an error when config values are invalid.
pub fn apply_config(
    args: &mut SockmeArgs,
    matches: &ArgMatches,
    config: &ConfigFile,
) -> AppResult<()> {
    if !is_cli(matches, "urls")
        && let Some(urls) = config.urls.clone()
    {
        args.urls = urls;
    }

    if !is_cli(matches, "duration")
        && let Some(duration) = config.duration
    {
        args.duration = ensure_positive_u64(duration, "duration")?;
    }

    if !is_cli(matches, "payloads")
        && let Some(payloads) = config.payloads.as_ref()
    {
        args.payloads = payloads.to_bounds().map_err(|err| invalid("payloads", err))?;
    }

    if !is_cli(matches, "frequency")
        && let Some(frequency) = config.frequency.as_ref()
    {
        args.frequency = frequency
            .to_bounds()
            .map_err(|err| invalid("frequency", err))?;
    }

    if !is_cli(matches, "interval")
        && let Some(interval) = config.interval
    {
        args.interval = interval;
    }

    if !is_cli(matches, "amount")
        && let Some(amount) = config.amount
    {
        args.amount = amount;
    }

    if !is_cli(matches, "concurrent")
        && let Some(concurrent) = config.concurrent
    {
        args.concurrent = Some(ensure_positive_u64(concurrent, "concurrent")?);
    }

    if !is_cli(matches, "buffer")
        && let Some(buffer) = config.buffer
    {
        args.buffer = Some(ensure_positive_u64(buffer, "buffer")?);
    }

    if !is_cli(matches, "workers")
        && let Some(workers) = config.workers
    {
        args.workers = ensure_positive_usize(workers, "workers")?;
    }

    if !is_cli(matches, "protocol")
        && let Some(protocol) = config.protocol.clone()
    {
        args.protocol = Some(protocol);
    }

    if !is_cli(matches, "generator")
        && let Some(generator) = config.generator.clone()
    {
        args.generator = Some(generator);
    }

    if !is_cli(matches, "no_live")
        && let Some(no_live) = config.no_live
    {
        args.no_live = no_live;
    }

    if !is_cli(matches, "worker_mode")
        && let Some(mode) = config.worker_mode
    {
        args.worker_mode = mode;
    }

    if !is_cli(matches, "connect_timeout")
        && let Some(timeout) = config.connect_timeout.as_ref()
    {
        args.connect_timeout = duration_field(timeout, "connect_timeout")?;
    }

    if !is_cli(matches, "drain_timeout")
        && let Some(timeout) = config.drain_timeout.as_ref()
    {
        args.drain_timeout = duration_field(timeout, "drain_timeout")?;
    }

    if !is_cli(matches, "metrics_out")
        && let Some(path) = config.metrics_out.clone()
    {
        args.metrics_out = Some(path);
    }

    if !is_cli(matches, "output_format")
        && let Some(format) = config.output_format
    {
        args.output_format = format;
    }

    if !is_cli(matches, "verbose")
        && let Some(verbose) = config.verbose
    {
        args.verbose = verbose;
    }

    if !is_cli(matches, "no_color")
        && let Some(no_color) = config.no_color
    {
        args.no_color = no_color;
    }

    Ok(())
}

fn is_cli(matches: &ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(ValueSource::CommandLine)
}

fn invalid(field: &'static str, source: ValidationError) -> AppError {
    AppError::config(ConfigError::InvalidField { field, source })
}

fn ensure_positive_u64(value: u64, field: &'static str) -> AppResult<PositiveU64> {
    PositiveU64::try_from(value).map_err(|err| invalid(field, err))
}

fn ensure_positive_usize(value: usize, field: &'static str) -> AppResult<PositiveUsize> {
    PositiveUsize::try_from(value).map_err(|err| invalid(field, err))
}

fn duration_field(value: &DurationValue, field: &'static str) -> AppResult<std::time::Duration> {
    value.to_duration().map_err(|err| match err {
        AppError::Validation(source) => invalid(field, source),
        other => other,
    })
}
