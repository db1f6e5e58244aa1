//! Run lifecycle: worker pool, ramps, the merged signal stream and shutdown.
mod config;
mod ledger;
mod progress;
mod signal;
mod state;

#[cfg(test)]
mod tests;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::Sleep;

use crate::dispatch::Dispatcher;
use crate::error::{AppError, AppResult, MetricsError};
use crate::ramp::{RampContext, run_ramp};
use crate::shutdown::ShutdownSender;
use crate::worker::protocol::ControlMessage;
use crate::worker::{WorkerHandle, spawn_worker};

pub use config::{MAX_PAYLOAD_BYTES, RunConfig};
pub use ledger::{ConcurrencyLedger, OutstandingLedger};
pub use signal::RunSignal;
pub use state::{ProgressSnapshot, RunFlow, RunReport, RunState};

/// How long a worker gets to exit once its control channel is closed.
const WORKER_EXIT_GRACE: Duration = Duration::from_secs(2);

/// Why the event loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every admitted connection closed.
    Drained,
    /// Shutdown was broadcast and the drain timeout expired first.
    DrainTimeout,
    /// Every worker exited.
    WorkersGone,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub report: RunReport,
    pub reason: StopReason,
}

/// Runs one load test end to end and returns its final report.
///
/// The run stops sending once `config.duration` elapses or shutdown is
/// broadcast on `shutdown_tx`, then waits up to `config.drain_timeout` for the
/// remaining connections to close. It ends early when every connection has
/// closed after all ramps finished.
///
/// # Errors
///
/// Returns an error when the worker pool cannot be started.
pub async fn run(config: RunConfig, shutdown_tx: &ShutdownSender) -> AppResult<RunOutcome> {
    let (signals_tx, mut signals_rx) = mpsc::unbounded_channel::<RunSignal>();

    let mut links = Vec::with_capacity(config.workers);
    let mut handles: Vec<WorkerHandle> = Vec::with_capacity(config.workers);
    for index in 0..config.workers {
        let (link, handle) = spawn_worker(
            config.worker_mode,
            index,
            config.worker_options.clone(),
            config.logging,
            &signals_tx,
        )?;
        links.push(link);
        handles.push(handle);
    }
    tracing::info!(
        "Started {} {} workers",
        handles.len(),
        config.worker_mode.as_str()
    );
    let dispatcher = Arc::new(Dispatcher::new(links)?);

    let (progress_tx, progress_rx) = watch::channel(ProgressSnapshot::default());
    let mut state = RunState::new(
        config.scheduled(),
        config.urls.len(),
        handles.len(),
        progress_tx,
    )?;
    let progress = config
        .live
        .then(|| progress::spawn_progress(progress_rx, shutdown_tx.subscribe(), config.no_color));

    let mut shutdown_rx = shutdown_tx.subscribe();
    let template = Arc::new(config.template.clone());
    let mut ramps = JoinSet::new();
    for url in &config.urls {
        let ctx = RampContext {
            plan: config.plan,
            template: Arc::clone(&template),
            dispatcher: Arc::clone(&dispatcher),
            signals: signals_tx.clone(),
        };
        ramps.spawn(run_ramp(url.clone(), ctx, shutdown_tx.subscribe()));
    }
    drop(signals_tx);

    let timer = tokio::time::sleep(config.duration);
    tokio::pin!(timer);
    let mut drain: Option<Pin<Box<Sleep>>> = None;

    let reason = loop {
        tokio::select! {
            () = &mut timer, if !state.is_stopping() => {
                tracing::info!("Run duration elapsed");
                begin_shutdown(&mut state, &dispatcher, shutdown_tx);
                drain = Some(Box::pin(tokio::time::sleep(config.drain_timeout)));
            }
            _ = shutdown_rx.recv(), if !state.is_stopping() => {
                tracing::info!("Shutdown requested");
                begin_shutdown(&mut state, &dispatcher, shutdown_tx);
                drain = Some(Box::pin(tokio::time::sleep(config.drain_timeout)));
            }
            () = elapsed(&mut drain), if drain.is_some() => {
                tracing::warn!(
                    "Drain timeout reached with {} connections still open",
                    state.outstanding()
                );
                break StopReason::DrainTimeout;
            }
            signal = signals_rx.recv() => match signal.map(|signal| state.handle(signal)) {
                Some(RunFlow::Continue) => {}
                Some(RunFlow::Drained) => break StopReason::Drained,
                Some(RunFlow::WorkersGone) | None => break StopReason::WorkersGone,
            },
        }
    };

    // Drained runs still tell ramps and progress to stop.
    begin_shutdown(&mut state, &dispatcher, shutdown_tx);
    let report = state.finalize();

    ramps.shutdown().await;
    drop(state);
    drop(dispatcher);
    join_all(
        handles
            .into_iter()
            .map(|handle| handle.finish(WORKER_EXIT_GRACE)),
    )
    .await;
    if let Some(progress) = progress
        && let Err(err) = progress.await
    {
        tracing::debug!("Progress task failed: {}", err);
    }

    let report = report.ok_or_else(|| AppError::metrics(MetricsError::AlreadyFinalized))?;
    tracing::info!("Run finished: {:?}", reason);
    Ok(RunOutcome { report, reason })
}

/// Broadcasts shutdown to ramps, progress and workers the first time it is
/// called.
fn begin_shutdown(state: &mut RunState, dispatcher: &Dispatcher, shutdown_tx: &ShutdownSender) {
    if !state.request_shutdown() {
        return;
    }
    drop(shutdown_tx.send(()));
    let reached = dispatcher.broadcast(&ControlMessage::shutdown());
    tracing::debug!("Shutdown sent to {}/{} workers", reached, dispatcher.len());
}

fn elapsed(deadline: &mut Option<Pin<Box<Sleep>>>) -> impl Future<Output = ()> + '_ {
    async move {
        match deadline {
            Some(sleep) => sleep.as_mut().await,
            None => std::future::pending().await,
        }
    }
}
