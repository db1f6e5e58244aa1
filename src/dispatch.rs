//! Round-robin assignment of connection tasks to workers.
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{AppError, AppResult, WorkerError};
use crate::worker::WorkerLink;
use crate::worker::protocol::{ConnectionTask, ControlMessage};

/// Fixed worker ring. `dispatch` is safe to call from every ramp at once; the
/// shared cursor hands out slots in strict rotation.
#[derive(Debug)]
pub struct Dispatcher {
    workers: Vec<WorkerLink>,
    cursor: AtomicUsize,
}

impl Dispatcher {
    /// # Errors
    ///
    /// Returns an error when `workers` is empty.
    pub fn new(workers: Vec<WorkerLink>) -> AppResult<Self> {
        if workers.is_empty() {
            return Err(AppError::worker(WorkerError::NoWorkers));
        }
        Ok(Self {
            workers,
            cursor: AtomicUsize::new(0),
        })
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.workers.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    fn next(&self) -> Option<&WorkerLink> {
        let slot = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.workers.get(slot.checked_rem(self.workers.len())?)
    }

    /// Hands `task` to the next worker in rotation, skipping workers whose
    /// control channel has closed. Returns the index of the accepting worker.
    ///
    /// # Errors
    ///
    /// Returns an error when no worker accepts the task.
    pub fn dispatch(&self, task: ConnectionTask) -> AppResult<usize> {
        let mut message = ControlMessage::Task(task);
        for _ in 0..self.workers.len() {
            let Some(worker) = self.next() else {
                break;
            };
            match worker.try_send(message) {
                Ok(()) => return Ok(worker.index()),
                Err(returned) => {
                    tracing::warn!("Worker {} is gone; trying the next one", worker.index());
                    message = returned;
                }
            }
        }
        Err(AppError::worker(WorkerError::NoWorkers))
    }

    /// Sends a copy of `message` to every worker. Returns how many accepted it.
    pub fn broadcast(&self, message: &ControlMessage) -> usize {
        self.workers
            .iter()
            .filter(|worker| match worker.send(message.clone()) {
                Ok(()) => true,
                Err(err) => {
                    tracing::debug!("Skipping worker {}: {}", worker.index(), err);
                    false
                }
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::test_task;
    use tokio::sync::mpsc;

    fn ring(count: usize) -> (Vec<WorkerLink>, Vec<mpsc::UnboundedReceiver<ControlMessage>>) {
        (0..count)
            .map(|index| {
                let (tx, rx) = mpsc::unbounded_channel();
                (WorkerLink::from_channel(index, tx), rx)
            })
            .unzip()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ControlMessage>) -> usize {
        let mut count = 0_usize;
        while rx.try_recv().is_ok() {
            count = count.saturating_add(1);
        }
        count
    }

    #[test]
    fn tasks_are_spread_evenly_in_rotation() -> AppResult<()> {
        let (links, mut receivers) = ring(4);
        let dispatcher = Dispatcher::new(links)?;

        let order: Vec<usize> = (1..=12)
            .map(|ordinal| dispatcher.dispatch(test_task("ws://a", ordinal)))
            .collect::<AppResult<_>>()?;
        if order != vec![0, 1, 2, 3, 0, 1, 2, 3, 0, 1, 2, 3] {
            return Err(AppError::worker(format!("Unexpected rotation {:?}", order)));
        }
        for rx in &mut receivers {
            let received = drain(rx);
            if received != 3 {
                return Err(AppError::worker(format!("Expected 3 tasks, got {}", received)));
            }
        }
        Ok(())
    }

    #[test]
    fn concurrent_dispatch_stays_fair() -> AppResult<()> {
        let (links, mut receivers) = ring(3);
        let dispatcher = Dispatcher::new(links)?;

        std::thread::scope(|scope| {
            for url in ["ws://a", "ws://b", "ws://c"] {
                let dispatcher = &dispatcher;
                scope.spawn(move || {
                    for ordinal in 1..=30 {
                        drop(dispatcher.dispatch(test_task(url, ordinal)));
                    }
                });
            }
        });

        for rx in &mut receivers {
            let received = drain(rx);
            if received != 30 {
                return Err(AppError::worker(format!("Expected 30 tasks, got {}", received)));
            }
        }
        Ok(())
    }

    #[test]
    fn closed_workers_are_skipped() -> AppResult<()> {
        let (links, mut receivers) = ring(2);
        let dispatcher = Dispatcher::new(links)?;
        let mut second = receivers.pop().ok_or_else(|| AppError::worker("missing rx"))?;
        drop(receivers);

        let first = dispatcher.dispatch(test_task("ws://a", 1))?;
        let again = dispatcher.dispatch(test_task("ws://a", 2))?;
        if first != 1 || again != 1 || drain(&mut second) != 2 {
            return Err(AppError::worker("Expected the live worker to take every task"));
        }
        Ok(())
    }

    #[test]
    fn empty_ring_is_rejected() -> AppResult<()> {
        match Dispatcher::new(Vec::new()) {
            Err(AppError::Worker(WorkerError::NoWorkers)) => Ok(()),
            other => Err(AppError::worker(format!("Unexpected result {:?}", other))),
        }
    }

    #[test]
    fn broadcast_reaches_every_worker() -> AppResult<()> {
        let (links, mut receivers) = ring(3);
        let dispatcher = Dispatcher::new(links)?;
        if dispatcher.broadcast(&ControlMessage::shutdown()) != 3 {
            return Err(AppError::worker("Expected three deliveries"));
        }
        for rx in &mut receivers {
            if rx.try_recv().ok() != Some(ControlMessage::shutdown()) {
                return Err(AppError::worker("Expected shutdown message"));
            }
        }
        Ok(())
    }
}
