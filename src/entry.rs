use std::ffi::OsString;
use std::path::Path;

use clap::{ArgMatches, CommandFactory, FromArgMatches};

use crate::args::{OutputFormat, SockmeArgs};
use crate::config::{apply_config, load_config};
use crate::error::AppResult;
use crate::logger::init_logging;
use crate::orchestrator::{self, RunConfig, StopReason};
use crate::shutdown_handlers::{setup_signal_shutdown_handler, shutdown_channel};
use crate::system::{print_banner, print_summary};
use crate::worker::{WorkerOptions, run_worker_process};

enum RunPlan {
    /// Hidden child role spawned by a controller in process mode.
    Worker(SockmeArgs),
    Controller { config: RunConfig, args: SockmeArgs },
}

/// Parses the command line and runs the selected role to completion.
///
/// # Errors
///
/// Returns an error for invalid arguments or configuration, a missing target
/// URL, or a worker pool that cannot be started. Per-connection failures never
/// surface here; they are part of the summary.
pub fn run() -> AppResult<()> {
    let (args, matches) = parse_args(std::env::args_os())?;
    match build_plan(args, &matches)? {
        RunPlan::Worker(args) => {
            init_logging(args.verbose, args.no_color, true);
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let options = WorkerOptions::from_args(&args)?;
            runtime.block_on(run_worker_process(options))
        }
        RunPlan::Controller { config, args } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(run_controller(config, &args))
        }
    }
}

fn parse_args<I>(raw_args: I) -> AppResult<(SockmeArgs, ArgMatches)>
where
    I: IntoIterator<Item = OsString>,
{
    let matches = SockmeArgs::command().get_matches_from(raw_args);
    let args = SockmeArgs::from_arg_matches(&matches)?;
    Ok((args, matches))
}

fn build_plan(mut args: SockmeArgs, matches: &ArgMatches) -> AppResult<RunPlan> {
    if args.worker_process {
        return Ok(RunPlan::Worker(args));
    }

    if let Some(file) = load_config(args.config.as_deref())? {
        apply_config(&mut args, matches, &file)?;
    }
    // Keep stdout clean for machine-readable summaries.
    let to_stderr = matches!(args.output_format, OutputFormat::Json);
    init_logging(args.verbose, args.no_color, to_stderr);

    let config = RunConfig::from_args(&args).inspect_err(|err| {
        tracing::error!("{}", err);
    })?;
    Ok(RunPlan::Controller { config, args })
}

async fn run_controller(config: RunConfig, args: &SockmeArgs) -> AppResult<()> {
    let (shutdown_tx, _) = shutdown_channel();
    let signal_handler = setup_signal_shutdown_handler(&shutdown_tx);

    if matches!(args.output_format, OutputFormat::Text) {
        print_banner(&config, args.no_color);
    }

    let outcome = orchestrator::run(config, &shutdown_tx).await;
    signal_handler.abort();
    let outcome = outcome?;

    if outcome.reason != StopReason::Drained {
        tracing::warn!(
            "Finalized with {} connections unaccounted for ({:?})",
            outcome.report.outstanding,
            outcome.reason
        );
    }
    print_summary(&outcome.report.summary, args.output_format, args.no_color)?;

    if let Some(path) = args.metrics_out.as_deref() {
        outcome
            .report
            .counters
            .write_prometheus(Path::new(path))
            .await?;
        tracing::info!("Wrote event counters to {}", path);
    }
    Ok(())
}
