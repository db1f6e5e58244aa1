use std::time::Duration;

use url::Url;

use crate::args::{PositiveU64, SockmeArgs, WorkerMode};
use crate::error::{AppError, AppResult, ValidationError};
use crate::ramp::{RampPlan, TaskTemplate};
use crate::worker::protocol::WsOptions;
use crate::worker::{ChildLogging, WorkerOptions};

/// Largest payload a message may carry; tungstenite's default message limit.
pub const MAX_PAYLOAD_BYTES: u64 = 67_108_864;

/// Validated settings for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub urls: Vec<String>,
    pub duration: Duration,
    pub interval_secs: u64,
    pub plan: RampPlan,
    pub template: TaskTemplate,
    pub workers: usize,
    pub worker_mode: WorkerMode,
    pub worker_options: WorkerOptions,
    pub logging: ChildLogging,
    pub drain_timeout: Duration,
    pub live: bool,
    pub no_color: bool,
}

impl RunConfig {
    /// # Errors
    ///
    /// Returns an error when no URL is given, a URL is not a valid
    /// `ws://`/`wss://` endpoint, a payload size exceeds
    /// [`MAX_PAYLOAD_BYTES`], or the generator file cannot be loaded.
    pub fn from_args(args: &SockmeArgs) -> AppResult<Self> {
        if args.urls.is_empty() {
            return Err(AppError::validation(ValidationError::MissingUrls));
        }
        let urls = args
            .urls
            .iter()
            .map(String::as_str)
            .map(validate_url)
            .collect::<AppResult<Vec<_>>>()?;
        check_payload_size("payloads", args.payloads.high())?;
        if let Some(buffer) = args.buffer {
            check_payload_size("buffer", buffer.get())?;
        }

        Ok(Self {
            urls,
            duration: Duration::from_secs(args.duration.get()),
            interval_secs: args.interval,
            plan: RampPlan::new(args.amount, args.concurrent, args.interval),
            template: TaskTemplate {
                frequency: args.frequency,
                payload: args.payloads,
                buffer: args.buffer.map(PositiveU64::get),
                wsoptions: WsOptions {
                    protocol: args.protocol.clone(),
                    per_message_deflate: false,
                },
            },
            workers: args.workers.get(),
            worker_mode: args.worker_mode,
            worker_options: WorkerOptions::from_args(args)?,
            logging: ChildLogging {
                verbose: args.verbose,
                no_color: args.no_color,
            },
            drain_timeout: args.drain_timeout,
            live: !args.no_live,
            no_color: args.no_color,
        })
    }

    /// Connections the run plans to open across every URL.
    #[must_use]
    pub fn scheduled(&self) -> u64 {
        let urls = u64::try_from(self.urls.len()).unwrap_or(u64::MAX);
        self.plan.amount().saturating_mul(urls)
    }
}

const fn check_payload_size(field: &'static str, value: u64) -> AppResult<()> {
    if value > MAX_PAYLOAD_BYTES {
        return Err(AppError::Validation(ValidationError::PayloadTooLarge {
            field,
            value,
            max: MAX_PAYLOAD_BYTES,
        }));
    }
    Ok(())
}

fn validate_url(value: &str) -> AppResult<String> {
    let parsed = Url::parse(value).map_err(|err| {
        AppError::validation(ValidationError::InvalidUrl {
            value: value.to_owned(),
            source: err,
        })
    })?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(value.to_owned()),
        other => Err(AppError::validation(ValidationError::UnsupportedScheme {
            value: value.to_owned(),
            scheme: other.to_owned(),
        })),
    }
}
