//! Paced admission of one URL's connections.
mod plan;
mod waiters;


use std::sync::Arc;

use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::mpsc;

use crate::args::Bounds;
use crate::dispatch::Dispatcher;
use crate::orchestrator::RunSignal;
use crate::shutdown::ShutdownReceiver;
use crate::worker::protocol::{ConnectionId, ConnectionTask, WsOptions};

pub use plan::RampPlan;
pub use waiters::{AdmissionOutcome, OpenRegistry, OpenTally, OpenWaits};

/// The per-run parts of a connection task; only the URL and id vary.
#[derive(Debug, Clone)]
pub struct TaskTemplate {
    pub frequency: Bounds,
    pub payload: Bounds,
    pub buffer: Option<u64>,
    pub wsoptions: WsOptions,
}

impl TaskTemplate {
    #[must_use]
    pub fn task(&self, url: &str, id: ConnectionId) -> ConnectionTask {
        ConnectionTask {
            url: url.to_owned(),
            frequency: self.frequency,
            payload: self.payload,
            buffer: self.buffer,
            wsoptions: self.wsoptions.clone(),
            id,
        }
    }
}

/// Everything one ramp needs besides its URL.
#[derive(Debug, Clone)]
pub struct RampContext {
    pub plan: RampPlan,
    pub template: Arc<TaskTemplate>,
    pub dispatcher: Arc<Dispatcher>,
    pub signals: mpsc::UnboundedSender<RunSignal>,
}

/// Admits `url`'s connections batch by batch, then waits until every admitted
/// connection has opened (or closed without opening) and reports
/// `RampComplete`.
///
/// Each admission is announced to the orchestrator before the task is
/// dispatched, so its events can never overtake it. Admission stops at the
/// first shutdown broadcast.
pub async fn run_ramp(url: String, ctx: RampContext, mut shutdown: ShutdownReceiver) {
    let plan = ctx.plan;
    tracing::info!("Connecting to {}", url);
    let mut waits = OpenWaits::default();
    let mut interrupted = false;

    for batch in 0..plan.batches() {
        if batch > 0 {
            tokio::select! {
                () = tokio::time::sleep(plan.delay()) => {}
                _ = shutdown.recv() => {
                    interrupted = true;
                    break;
                }
            }
        }
        if shutdown_requested(&mut shutdown) {
            interrupted = true;
            break;
        }

        for ordinal in plan.batch_ordinals(batch) {
            let id = ConnectionId::new(&url, ordinal);
            let opened = waits.admit();
            let admitted = RunSignal::Admitted {
                id: id.clone(),
                opened,
            };
            if ctx.signals.send(admitted).is_err() {
                return;
            }
            if let Err(err) = ctx.dispatcher.dispatch(ctx.template.task(&url, id.clone())) {
                let rejected = RunSignal::Rejected {
                    id,
                    reason: err.to_string(),
                };
                if ctx.signals.send(rejected).is_err() {
                    return;
                }
            }
        }
        tracing::debug!(
            "Admitted batch {}/{} for {}",
            batch.saturating_add(1),
            plan.batches(),
            url
        );
    }

    if interrupted {
        tracing::info!(
            "Stopped admitting for {} after {} of {} connections",
            url,
            waits.len(),
            plan.amount()
        );
    }

    let tally = waits.wait_all().await;
    tracing::debug!(
        "All admissions settled for {} ({} opened, {} abandoned)",
        url,
        tally.opened,
        tally.abandoned
    );
    drop(ctx.signals.send(RunSignal::RampComplete { url, tally }));
}

fn shutdown_requested(shutdown: &mut ShutdownReceiver) -> bool {
    match shutdown.try_recv() {
        Err(TryRecvError::Empty) => false,
        Ok(()) | Err(TryRecvError::Closed | TryRecvError::Lagged(_)) => true,
    }
}
