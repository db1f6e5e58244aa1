use tokio::sync::oneshot;

use crate::ramp::{AdmissionOutcome, OpenTally};
use crate::worker::protocol::{ConnectionId, Event};

/// Everything the orchestrator's event loop consumes, multiplexed from every
/// ramp and every worker onto one channel.
#[derive(Debug)]
pub enum RunSignal {
    /// A ramp is about to dispatch `id`. Always precedes that connection's
    /// events.
    Admitted {
        id: ConnectionId,
        opened: oneshot::Sender<AdmissionOutcome>,
    },
    /// No worker accepted the task for `id`.
    Rejected { id: ConnectionId, reason: String },
    Event { worker: usize, event: Event },
    RampComplete { url: String, tally: OpenTally },
    WorkerExited { worker: usize },
}
