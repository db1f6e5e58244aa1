use std::time::Duration;

use serde::Deserialize;

use crate::args::parsers::{parse_bounds, parse_duration_arg};
use crate::args::{Bounds, OutputFormat, WorkerMode};
use crate::error::{AppError, AppResult, ValidationError};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub urls: Option<Vec<String>>,
    pub duration: Option<u64>,
    pub payloads: Option<BoundsValue>,
    pub frequency: Option<BoundsValue>,
    pub interval: Option<u64>,
    #[serde(alias = "connections")]
    pub amount: Option<u64>,
    pub concurrent: Option<u64>,
    pub buffer: Option<u64>,
    pub workers: Option<usize>,
    pub protocol: Option<String>,
    pub generator: Option<String>,
    pub no_live: Option<bool>,
    pub worker_mode: Option<WorkerMode>,
    pub connect_timeout: Option<DurationValue>,
    pub drain_timeout: Option<DurationValue>,
    pub metrics_out: Option<String>,
    pub output_format: Option<OutputFormat>,
    pub verbose: Option<bool>,
    pub no_color: Option<bool>,
}

/// A range written either as `[1, 1024]` or as `"1,1024"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BoundsValue {
    Pair([u64; 2]),
    Text(String),
}

impl BoundsValue {
    pub(crate) fn to_bounds(&self) -> Result<Bounds, ValidationError> {
        match self {
            BoundsValue::Pair(pair) => Ok(Bounds::from(*pair)),
            BoundsValue::Text(text) => parse_bounds(text),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DurationValue {
    Seconds(u64),
    Text(String),
}

impl DurationValue {
    pub(crate) fn to_duration(&self) -> AppResult<Duration> {
        match self {
            DurationValue::Seconds(secs) => {
                if *secs == 0 {
                    Err(AppError::validation(ValidationError::DurationZero))
                } else {
                    Ok(Duration::from_secs(*secs))
                }
            }
            DurationValue::Text(text) => parse_duration_arg(text),
        }
    }
}
