use clap::Parser;
use std::time::Duration;

use super::defaults::default_workers;
use super::parsers::{
    parse_bool_env, parse_bounds, parse_duration_arg, parse_positive_u64, parse_positive_usize,
};
use super::types::{Bounds, OutputFormat, PositiveU64, PositiveUsize, WorkerMode};

#[derive(Debug, Parser, Clone)]
#[clap(
    version,
    about = "Distributed WebSocket load generator - opens many persistent connections, drives them with randomized traffic, and summarizes what happened."
)]
pub struct SockmeArgs {
    /// Target WebSocket endpoints (ws:// or wss://)
    #[arg(value_name = "URLS")]
    pub urls: Vec<String>,

    /// Duration in seconds to send messages for
    #[arg(
        long = "duration",
        short = 'D',
        default_value = "30",
        value_parser = parse_positive_u64
    )]
    pub duration: PositiveU64,

    /// Comma separated min and max payload size in bytes
    #[arg(long = "payloads", short = 'p', default_value = "1,1024", value_parser = parse_bounds)]
    pub payloads: Bounds,

    /// Comma separated min and max delay between messages in ms
    #[arg(long = "frequency", short = 'F', default_value = "100,1000", value_parser = parse_bounds)]
    pub frequency: Bounds,

    /// Seconds over which to bring connections up
    #[arg(long = "interval", short = 'I', default_value = "0")]
    pub interval: u64,

    /// Persistent connections to generate per URL
    #[arg(long = "amount", short = 'A', default_value = "10000")]
    pub amount: u64,

    /// Connections to admit at a time per URL (default: all at once)
    #[arg(long = "concurrent", short = 'C', value_parser = parse_positive_u64)]
    pub concurrent: Option<PositiveU64>,

    /// Fixed message size in bytes, overrides --payloads
    #[arg(long = "buffer", short = 'B', value_parser = parse_positive_u64)]
    pub buffer: Option<PositiveU64>,

    /// Worker count (default: host CPU count)
    #[arg(
        long = "workers",
        short = 'W',
        default_value_t = default_workers(),
        value_parser = parse_positive_usize
    )]
    pub workers: PositiveUsize,

    /// WebSocket subprotocol to request
    #[arg(long = "protocol", short = 'P')]
    pub protocol: Option<String>,

    /// Text file whose contents fill message payloads instead of filler bytes
    #[arg(long = "generator", short = 'G')]
    pub generator: Option<String>,

    /// Disable the live progress line
    #[arg(long = "no-live", short = 'L')]
    pub no_live: bool,

    /// How workers are hosted
    #[arg(long = "worker-mode", value_enum, default_value = "process")]
    pub worker_mode: WorkerMode,

    /// Timeout for the WebSocket connect handshake (supports ms/s/m)
    #[arg(
        long = "connect-timeout",
        default_value = "10s",
        value_parser = parse_duration_arg
    )]
    pub connect_timeout: Duration,

    /// How long to wait for open connections to close after shutdown (supports ms/s/m)
    #[arg(
        long = "drain-timeout",
        default_value = "5s",
        value_parser = parse_duration_arg
    )]
    pub drain_timeout: Duration,

    /// Write event counters as Prometheus text to this path when the run ends
    #[arg(long = "metrics-out")]
    pub metrics_out: Option<String>,

    /// Summary output format
    #[arg(long = "output-format", value_enum, default_value = "text")]
    pub output_format: OutputFormat,

    /// Path to config file (TOML/JSON). Defaults to ./sockme.toml or ./sockme.json if present.
    #[arg(long)]
    pub config: Option<String>,

    /// Enable verbose logging (sets log level to debug unless overridden by SOCKME_LOG/RUST_LOG)
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Disable color output
    #[arg(
        long = "no-color",
        env = "NO_COLOR",
        value_parser = parse_bool_env,
        num_args = 0..=1,
        require_equals = true,
        default_value = "false",
        default_missing_value = "true"
    )]
    pub no_color: bool,

    /// Run as a worker child: read tasks from stdin, write events to stdout
    #[arg(long = "worker-process", hide = true)]
    pub worker_process: bool,
}
