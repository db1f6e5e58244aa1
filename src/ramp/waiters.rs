use std::collections::HashMap;

use futures_util::future::join_all;
use tokio::sync::oneshot;

use crate::worker::protocol::ConnectionId;

/// How an admitted connection's open wait was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionOutcome {
    Opened,
    /// Closed (or failed) without ever opening.
    Abandoned,
}

/// Orchestrator-held half of the per-connection open notifications. Settled on
/// the connection's `open` event, or on its `close` if it never opened.
#[derive(Debug, Default)]
pub struct OpenRegistry {
    pending: HashMap<ConnectionId, oneshot::Sender<AdmissionOutcome>>,
}

impl OpenRegistry {
    pub fn register(&mut self, id: ConnectionId, notify: oneshot::Sender<AdmissionOutcome>) {
        if self.pending.insert(id.clone(), notify).is_some() {
            tracing::warn!("Replaced an open waiter for {}", id);
        }
    }

    /// Returns `true` when a waiter for `id` existed.
    pub fn settle(&mut self, id: &ConnectionId, outcome: AdmissionOutcome) -> bool {
        self.pending.remove(id).is_some_and(|notify| {
            if notify.send(outcome).is_err() {
                tracing::debug!("Ramp no longer waiting on {}", id);
            }
            true
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Ramp-held half: one receiver per admitted connection.
#[derive(Debug, Default)]
pub struct OpenWaits {
    receivers: Vec<oneshot::Receiver<AdmissionOutcome>>,
}

/// Tally of a ramp's settled waits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenTally {
    pub opened: u64,
    pub abandoned: u64,
}

impl OpenWaits {
    /// Creates the pair for one admission and keeps the receiving end.
    pub fn admit(&mut self) -> oneshot::Sender<AdmissionOutcome> {
        let (tx, rx) = oneshot::channel();
        self.receivers.push(rx);
        tx
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.receivers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receivers.is_empty()
    }

    /// Resolves once every admitted connection has been settled. A dropped
    /// sender counts as abandoned.
    pub async fn wait_all(self) -> OpenTally {
        join_all(self.receivers)
            .await
            .into_iter()
            .fold(OpenTally::default(), |mut tally, outcome| {
                match outcome {
                    Ok(AdmissionOutcome::Opened) => tally.opened = tally.opened.saturating_add(1),
                    Ok(AdmissionOutcome::Abandoned) | Err(_) => {
                        tally.abandoned = tally.abandoned.saturating_add(1);
                    }
                }
                tally
            })
    }
}
