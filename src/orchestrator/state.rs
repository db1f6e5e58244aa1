use tokio::sync::watch;

use super::ledger::{ConcurrencyLedger, OutstandingLedger};
use super::signal::RunSignal;
use crate::error::AppResult;
use crate::metrics::{MetricsSummary, RunMetrics};
use crate::ramp::{AdmissionOutcome, OpenRegistry};
use crate::sinks::EventCounters;
use crate::worker::protocol::{ConnectionId, Event};

/// What the event loop should do after a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunFlow {
    Continue,
    /// Every ramp finished and every admitted connection closed.
    Drained,
    /// No worker is left to produce events.
    WorkersGone,
}

/// Live figures for the progress line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub created: u64,
    pub active: u64,
}

/// Result of the one and only finalization.
#[derive(Debug)]
pub struct RunReport {
    pub summary: MetricsSummary,
    pub counters: EventCounters,
    pub outstanding: u64,
}

/// State owned by the orchestrator's event loop. Nothing here is shared; every
/// mutation happens in [`RunState::handle`].
#[derive(Debug)]
pub struct RunState {
    outstanding: OutstandingLedger,
    concurrency: ConcurrencyLedger,
    opens: OpenRegistry,
    metrics: RunMetrics,
    counters: EventCounters,
    created: u64,
    ramps_pending: usize,
    workers_alive: usize,
    stopping: bool,
    finalized: bool,
    progress: watch::Sender<ProgressSnapshot>,
}

impl RunState {
    /// # Errors
    ///
    /// Returns an error if the metrics histograms cannot be created.
    pub fn new(
        scheduled: u64,
        ramps: usize,
        workers: usize,
        progress: watch::Sender<ProgressSnapshot>,
    ) -> AppResult<Self> {
        Ok(Self {
            outstanding: OutstandingLedger::default(),
            concurrency: ConcurrencyLedger::default(),
            opens: OpenRegistry::default(),
            metrics: RunMetrics::new(scheduled)?,
            counters: EventCounters::new(),
            created: 0,
            ramps_pending: ramps,
            workers_alive: workers,
            stopping: false,
            finalized: false,
            progress,
        })
    }

    pub fn handle(&mut self, signal: RunSignal) -> RunFlow {
        match signal {
            RunSignal::Admitted { id, opened } => {
                self.outstanding.admit(id.clone());
                self.opens.register(id, opened);
            }
            RunSignal::Rejected { id, reason } => {
                tracing::error!("Could not dispatch {}: {}", id, reason);
                let event = Event::Error {
                    id: id.clone(),
                    message: reason,
                };
                self.metrics.record(&event);
                self.counters.record(&event);
                self.outstanding.close(&id);
                self.opens.settle(&id, AdmissionOutcome::Abandoned);
            }
            RunSignal::Event { event, .. } => self.apply(&event),
            RunSignal::RampComplete { url, tally } => {
                self.ramps_pending = self.ramps_pending.saturating_sub(1);
                tracing::info!(
                    "Finished connecting to {} ({} opened, {} never opened)",
                    url,
                    tally.opened,
                    tally.abandoned
                );
                if self.ramps_pending == 0 {
                    self.metrics.established();
                }
            }
            RunSignal::WorkerExited { worker } => {
                self.workers_alive = self.workers_alive.saturating_sub(1);
                if self.stopping {
                    tracing::debug!("Worker {} exited", worker);
                } else {
                    tracing::error!("Worker {} exited before shutdown", worker);
                }
            }
        }

        self.publish_progress();
        if self.is_drained() {
            RunFlow::Drained
        } else if self.workers_alive == 0 {
            RunFlow::WorkersGone
        } else {
            RunFlow::Continue
        }
    }

    fn apply(&mut self, event: &Event) {
        self.metrics.record(event);
        self.counters.record(event);
        match event {
            Event::Open { id, duration } => {
                tracing::debug!("Opened {} in {}ms", id, duration);
                self.created = self.created.saturating_add(1);
                self.concurrency.open(id.clone());
                self.opens.settle(id, AdmissionOutcome::Opened);
            }
            Event::Close { id, .. } => self.close(id),
            Event::Disconnect { id, message } => {
                tracing::debug!("Disconnected {}: {}", id, message);
            }
            Event::Error { id, message } => tracing::debug!("Error on {}: {}", id, message),
            Event::Message { .. } | Event::Sent { .. } => {}
        }
    }

    fn close(&mut self, id: &ConnectionId) {
        self.concurrency.close(id);
        if !self.outstanding.close(id) {
            tracing::warn!("Close for unknown connection {}", id);
        }
        self.opens.settle(id, AdmissionOutcome::Abandoned);
    }

    fn publish_progress(&self) {
        self.progress.send_replace(ProgressSnapshot {
            created: self.created,
            active: self.concurrency.active(),
        });
    }

    /// The drained exit only counts once every ramp has finished admitting.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.ramps_pending == 0 && self.outstanding.is_empty()
    }

    #[must_use]
    pub const fn outstanding(&self) -> u64 {
        self.outstanding.len()
    }

    /// Marks the run as stopping. Returns `true` only on the first call, so
    /// the shutdown broadcast goes out once whichever path triggers it.
    pub fn request_shutdown(&mut self) -> bool {
        if self.stopping {
            return false;
        }
        self.stopping = true;
        true
    }

    #[must_use]
    pub const fn is_stopping(&self) -> bool {
        self.stopping
    }

    /// Stops the clock and hands out the report. Every later call returns
    /// `None`.
    pub fn finalize(&mut self) -> Option<RunReport> {
        if self.finalized {
            return None;
        }
        self.finalized = true;
        self.metrics.stop();
        Some(RunReport {
            summary: self.metrics.summary(),
            counters: std::mem::take(&mut self.counters),
            outstanding: self.outstanding.len(),
        })
    }
}
