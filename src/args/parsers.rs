use std::time::Duration;

use super::types::{Bounds, PositiveU64, PositiveUsize};
use crate::error::{AppError, AppResult, BoundsPart, ValidationError};

pub(super) fn parse_positive_u64(s: &str) -> AppResult<PositiveU64> {
    s.parse::<PositiveU64>().map_err(AppError::from)
}

pub(super) fn parse_positive_usize(s: &str) -> AppResult<PositiveUsize> {
    s.parse::<PositiveUsize>().map_err(AppError::from)
}

/// Parses a comma separated pair such as `1,1024`. A single number is a
/// degenerate range with both ends equal.
pub(crate) fn parse_bounds(s: &str) -> Result<Bounds, ValidationError> {
    let value = s.trim();
    let (first, second) = match value.split_once(',') {
        Some((first, second)) => (first.trim(), second.trim()),
        None => (value, value),
    };
    if first.is_empty() || second.is_empty() || second.contains(',') {
        return Err(ValidationError::InvalidBoundsFormat {
            value: s.to_owned(),
        });
    }
    let first: u64 = first
        .parse()
        .map_err(|err| ValidationError::InvalidBoundsNumber {
            value: s.to_owned(),
            part: BoundsPart::First,
            source: err,
        })?;
    let second: u64 = second
        .parse()
        .map_err(|err| ValidationError::InvalidBoundsNumber {
            value: s.to_owned(),
            part: BoundsPart::Second,
            source: err,
        })?;
    Ok(Bounds::new(first, second))
}

pub(crate) fn parse_bool_env(s: &str) -> AppResult<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "" | "1" | "true" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "no" | "n" | "off" => Ok(false),
        _ => Err(AppError::validation(ValidationError::InvalidBoolean {
            value: s.to_owned(),
        })),
    }
}

pub(crate) fn parse_duration_arg(s: &str) -> AppResult<Duration> {
    let value = s.trim();
    if value.is_empty() {
        return Err(AppError::validation(ValidationError::DurationEmpty));
    }

    let mut digits_len = 0usize;
    for ch in value.chars() {
        if ch.is_ascii_digit() {
            digits_len = digits_len.saturating_add(1);
        } else {
            break;
        }
    }
    if digits_len == 0 {
        return Err(AppError::validation(
            ValidationError::InvalidDurationFormat {
                value: value.to_owned(),
            },
        ));
    }
    let (num_part, unit_part) = value.split_at(digits_len);
    let number: u64 = num_part.parse().map_err(|err| {
        AppError::validation(ValidationError::InvalidDurationNumber {
            value: value.to_owned(),
            source: err,
        })
    })?;

    let unit = if unit_part.is_empty() { "s" } else { unit_part };
    let duration = match unit {
        "ms" => Duration::from_millis(number),
        "s" => Duration::from_secs(number),
        "m" => {
            let secs = number
                .checked_mul(60)
                .ok_or_else(|| AppError::validation(ValidationError::DurationOverflow))?;
            Duration::from_secs(secs)
        }
        _ => {
            return Err(AppError::validation(ValidationError::InvalidDurationUnit {
                unit: unit.to_owned(),
            }));
        }
    };

    if duration.as_millis() == 0 {
        return Err(AppError::validation(ValidationError::DurationZero));
    }

    Ok(duration)
}
