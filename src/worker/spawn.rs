use std::process::Stdio;
use std::time::Duration;

use tokio::io::BufReader;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

use super::io::{read_message, send_message};
use super::protocol::{ControlMessage, Event};
use super::{WorkerOptions, run_worker};
use crate::args::WorkerMode;
use crate::error::{AppError, AppResult, WorkerError};
use crate::orchestrator::RunSignal;

/// Orchestrator-side sending half of a worker's control channel.
#[derive(Debug, Clone)]
pub struct WorkerLink {
    index: usize,
    control: mpsc::UnboundedSender<ControlMessage>,
}

impl WorkerLink {
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Queues a control message for the worker.
    ///
    /// # Errors
    ///
    /// Returns an error when the worker's control channel has closed.
    pub fn send(&self, message: ControlMessage) -> AppResult<()> {
        self.control.send(message).map_err(|_closed| {
            AppError::worker(WorkerError::ControlChannelClosed { index: self.index })
        })
    }

    /// Like [`WorkerLink::send`], but hands the message back when the channel
    /// has closed so it can go elsewhere.
    ///
    /// # Errors
    ///
    /// Returns the undelivered message.
    pub fn try_send(&self, message: ControlMessage) -> Result<(), ControlMessage> {
        self.control.send(message).map_err(|closed| closed.0)
    }

    #[cfg(test)]
    pub(crate) const fn from_channel(
        index: usize,
        control: mpsc::UnboundedSender<ControlMessage>,
    ) -> Self {
        Self { index, control }
    }
}

#[derive(Debug)]
enum HostKind {
    Process(Child),
    Thread(oneshot::Receiver<()>),
}

/// Keeps a worker host alive for the run. Dropping a process handle kills the
/// child.
#[derive(Debug)]
pub struct WorkerHandle {
    index: usize,
    host: HostKind,
}

impl WorkerHandle {
    /// Waits up to `grace` for the worker to exit after its control channel was
    /// closed. A child process that outlives the grace period is killed.
    pub async fn finish(self, grace: Duration) {
        let index = self.index;
        match self.host {
            HostKind::Process(mut child) => {
                match tokio::time::timeout(grace, child.wait()).await {
                    Ok(Ok(status)) => tracing::debug!("Worker {} exited with {}", index, status),
                    Ok(Err(err)) => tracing::warn!("Failed to wait for worker {}: {}", index, err),
                    Err(_elapsed) => {
                        tracing::warn!("Worker {} did not exit in time; killing it", index);
                        if let Err(err) = child.kill().await {
                            tracing::warn!("Failed to kill worker {}: {}", index, err);
                        }
                    }
                }
            }
            HostKind::Thread(done) => match tokio::time::timeout(grace, done).await {
                Ok(_finished) => tracing::debug!("Worker thread {} finished", index),
                Err(_elapsed) => {
                    tracing::warn!("Worker thread {} did not finish in time; detaching", index);
                }
            },
        }
    }
}

/// Logging flags forwarded to worker child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChildLogging {
    pub verbose: bool,
    pub no_color: bool,
}

/// Starts worker `index` in the requested mode and wires its events into
/// `signals`. Every event is tagged with the worker index; when the worker's
/// event stream ends a `WorkerExited` signal follows.
///
/// # Errors
///
/// Returns an error when the thread or child process cannot be started.
pub fn spawn_worker(
    mode: WorkerMode,
    index: usize,
    options: WorkerOptions,
    logging: ChildLogging,
    signals: &mpsc::UnboundedSender<RunSignal>,
) -> AppResult<(WorkerLink, WorkerHandle)> {
    match mode {
        WorkerMode::Thread => spawn_thread_worker(index, options, signals),
        WorkerMode::Process => spawn_process_worker(index, options, logging, signals),
    }
}

fn spawn_thread_worker(
    index: usize,
    options: WorkerOptions,
    signals: &mpsc::UnboundedSender<RunSignal>,
) -> AppResult<(WorkerLink, WorkerHandle)> {
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (done_tx, done_rx) = oneshot::channel();

    std::thread::Builder::new()
        .name(format!("sockme-worker-{}", index))
        .spawn(move || {
            match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime.block_on(run_worker(control_rx, events_tx, options)),
                Err(err) => tracing::error!("Worker {} failed to build runtime: {}", index, err),
            }
            if done_tx.send(()).is_err() {
                tracing::debug!("Worker {} finished after its handle was dropped", index);
            }
        })
        .map_err(|err| AppError::worker(WorkerError::Spawn { index, source: err }))?;

    tokio::spawn(forward_channel_events(index, events_rx, signals.clone()));

    Ok((
        WorkerLink {
            index,
            control: control_tx,
        },
        WorkerHandle {
            index,
            host: HostKind::Thread(done_rx),
        },
    ))
}

fn spawn_process_worker(
    index: usize,
    options: WorkerOptions,
    logging: ChildLogging,
    signals: &mpsc::UnboundedSender<RunSignal>,
) -> AppResult<(WorkerLink, WorkerHandle)> {
    let exe = std::env::current_exe()
        .map_err(|err| AppError::worker(WorkerError::CurrentExe { source: err }))?;
    let mut command = Command::new(exe);
    command
        .arg("--worker-process")
        .arg("--connect-timeout")
        .arg(format!("{}ms", options.connect_timeout.as_millis()))
        .arg("--drain-timeout")
        .arg(format!("{}ms", options.drain_timeout.as_millis()))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    if logging.verbose {
        command.arg("--verbose");
    }
    if logging.no_color {
        command.arg("--no-color");
    }
    if let Some(source) = options.generator.as_ref() {
        command.arg("--generator").arg(source.path());
    }

    let mut child = command
        .spawn()
        .map_err(|err| AppError::worker(WorkerError::Spawn { index, source: err }))?;
    let mut stdin = child.stdin.take().ok_or_else(|| {
        AppError::worker(WorkerError::MissingPipe {
            index,
            stream: "stdin",
        })
    })?;
    let stdout = child.stdout.take().ok_or_else(|| {
        AppError::worker(WorkerError::MissingPipe {
            index,
            stream: "stdout",
        })
    })?;
    tracing::debug!("Spawned worker process {} (pid {:?})", index, child.id());

    let (control_tx, mut control_rx) = mpsc::unbounded_channel::<ControlMessage>();
    tokio::spawn(async move {
        while let Some(message) = control_rx.recv().await {
            if let Err(err) = send_message(&mut stdin, &message).await {
                tracing::error!("Failed to write to worker {}: {}", index, err);
                break;
            }
        }
    });

    let signals = signals.clone();
    tokio::spawn(async move {
        let mut reader = BufReader::new(stdout);
        loop {
            match read_message::<_, Event>(&mut reader).await {
                Ok(Some(event)) => {
                    if signals.send(RunSignal::Event { worker: index, event }).is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(AppError::Worker(WorkerError::Io { source, .. })) => {
                    tracing::error!("Failed to read from worker {}: {}", index, source);
                    break;
                }
                Err(err) => tracing::warn!("Skipping malformed event from worker {}: {}", index, err),
            }
        }
        drop(signals.send(RunSignal::WorkerExited { worker: index }));
    });

    Ok((
        WorkerLink {
            index,
            control: control_tx,
        },
        WorkerHandle {
            index,
            host: HostKind::Process(child),
        },
    ))
}

async fn forward_channel_events(
    index: usize,
    mut events: mpsc::UnboundedReceiver<Event>,
    signals: mpsc::UnboundedSender<RunSignal>,
) {
    while let Some(event) = events.recv().await {
        if signals.send(RunSignal::Event { worker: index, event }).is_err() {
            return;
        }
    }
    drop(signals.send(RunSignal::WorkerExited { worker: index }));
}
