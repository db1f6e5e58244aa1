use tokio::io::BufReader;
use tokio::sync::mpsc;

use super::io::{read_message, send_message};
use super::protocol::{ControlMessage, Event};
use super::{WorkerOptions, run_worker};
use crate::error::{AppError, AppResult, WorkerError};

/// Entry point of a worker child: control messages arrive as JSON lines on
/// stdin, events leave as JSON lines on stdout. Returns once stdin closes and
/// every hosted connection has reported its close.
///
/// # Errors
///
/// Returns an error when stdin cannot be read or stdout cannot be written.
pub async fn run_worker_process(options: WorkerOptions) -> AppResult<()> {
    let interrupts = tokio::spawn(ignore_interrupts());
    let (control_tx, control_rx) = mpsc::unbounded_channel::<ControlMessage>();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<Event>();

    let reader = tokio::spawn(async move {
        let mut stdin = BufReader::new(tokio::io::stdin());
        loop {
            match read_message::<_, ControlMessage>(&mut stdin).await {
                Ok(Some(message)) => {
                    if control_tx.send(message).is_err() {
                        return Ok(());
                    }
                }
                Ok(None) => return Ok(()),
                Err(AppError::Worker(WorkerError::Io { context, source })) => {
                    return Err(AppError::worker(WorkerError::Io { context, source }));
                }
                Err(err) => tracing::warn!("Skipping malformed control message: {}", err),
            }
        }
    });

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(event) = events_rx.recv().await {
            send_message(&mut stdout, &event).await?;
        }
        Ok::<(), AppError>(())
    });

    run_worker(control_rx, events_tx, options).await;
    interrupts.abort();

    writer.await??;
    reader.await??;
    Ok(())
}

/// Ctrl-C reaches the whole process group. Workers wait for the controller's
/// shutdown message instead of dying mid-connection.
async fn ignore_interrupts() {
    loop {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::debug!("Worker ignoring interrupt; waiting for the controller"),
            Err(err) => {
                tracing::warn!("Failed to listen for interrupts: {}", err);
                return;
            }
        }
    }
}
