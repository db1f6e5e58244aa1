//! Worker hosts: many agents behind one control channel and one event channel.
pub mod io;
mod process;
pub mod protocol;
mod spawn;


use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use crate::agent::{AgentContext, CLOSE_HANDSHAKE_TIMEOUT, run_agent};
use crate::args::SockmeArgs;
use crate::error::AppResult;
use crate::generator::{PayloadCache, PayloadSource};

use protocol::{ConnectionId, ControlMessage, Event, ShutdownMessage};

pub use process::run_worker_process;
pub use spawn::{ChildLogging, WorkerHandle, WorkerLink, spawn_worker};

/// Settings a worker applies to every agent it hosts.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub connect_timeout: Duration,
    /// The orchestrator's drain timeout; bounds how long agents wait on a close.
    pub drain_timeout: Duration,
    pub generator: Option<PayloadSource>,
}

impl WorkerOptions {
    /// # Errors
    ///
    /// Returns an error when the `--generator` file cannot be loaded.
    pub fn from_args(args: &SockmeArgs) -> AppResult<Self> {
        let generator = args
            .generator
            .as_deref()
            .map(|path| PayloadSource::load(Path::new(path)))
            .transpose()?;
        Ok(Self {
            connect_timeout: args.connect_timeout,
            drain_timeout: args.drain_timeout,
            generator,
        })
    }

    /// Half the drain timeout, capped at [`CLOSE_HANDSHAKE_TIMEOUT`]. A peer
    /// that never answers our close frame still gets its close reported while
    /// the orchestrator is draining.
    #[must_use]
    pub fn close_timeout(&self) -> Duration {
        self.drain_timeout
            .checked_div(2)
            .unwrap_or(Duration::ZERO)
            .min(CLOSE_HANDSHAKE_TIMEOUT)
    }
}

/// Runs the worker loop until the control channel closes and every hosted
/// agent has finished.
///
/// A shutdown message only asks agents to stop; the worker keeps running so
/// that their close events still reach the orchestrator.
pub async fn run_worker(
    mut control: mpsc::UnboundedReceiver<ControlMessage>,
    events: mpsc::UnboundedSender<Event>,
    options: WorkerOptions,
) {
    let ctx = AgentContext {
        close_timeout: options.close_timeout(),
        cache: Arc::new(PayloadCache::with_source(options.generator)),
        events,
        connect_timeout: options.connect_timeout,
    };
    let mut active: HashMap<ConnectionId, watch::Sender<bool>> = HashMap::new();
    let mut agents: JoinSet<ConnectionId> = JoinSet::new();
    let mut stopping = false;
    let mut control_open = true;

    loop {
        tokio::select! {
            message = control.recv(), if control_open => match message {
                Some(ControlMessage::Task(task)) => {
                    let id = task.id.clone();
                    let (stop_tx, stop_rx) = watch::channel(stopping);
                    if active.insert(id.clone(), stop_tx).is_some() {
                        tracing::warn!("Connection id {} was assigned twice", id);
                    }
                    let agent_ctx = ctx.clone();
                    agents.spawn(async move {
                        run_agent(task, agent_ctx, stop_rx).await;
                        id
                    });
                }
                Some(ControlMessage::Shutdown(ShutdownMessage { shutdown: true })) => {
                    stopping = true;
                    stop_all(&active);
                }
                Some(ControlMessage::Shutdown(ShutdownMessage { shutdown: false })) => {}
                None => {
                    control_open = false;
                    stopping = true;
                    stop_all(&active);
                }
            },
            Some(joined) = agents.join_next() => match joined {
                Ok(id) => {
                    active.remove(&id);
                }
                Err(err) => tracing::error!("Agent task failed: {}", err),
            },
            else => break,
        }
    }
    tracing::debug!("Worker loop finished");
}

fn stop_all(active: &HashMap<ConnectionId, watch::Sender<bool>>) {
    tracing::debug!("Stopping {} active connections", active.len());
    for stop in active.values() {
        stop.send_replace(true);
    }
}
