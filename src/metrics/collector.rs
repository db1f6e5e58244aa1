use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::histogram::SizeHistogram;
use super::types::{ErrorCount, MetricsSummary, TrafficSummary};
use crate::error::AppResult;
use crate::worker::protocol::Event;

/// Prefix applied to disconnect reasons in the error tally.
const DISCONNECT_PREFIX: &str = "Disconnect: ";

#[derive(Debug, Clone)]
struct SizeStats {
    delta_total: u64,
    count: u64,
    min: Option<u64>,
    max: u64,
    histogram: SizeHistogram,
}

impl SizeStats {
    fn new() -> AppResult<Self> {
        Ok(Self {
            delta_total: 0,
            count: 0,
            min: None,
            max: 0,
            histogram: SizeHistogram::new()?,
        })
    }

    fn record(&mut self, bytes: u64) {
        self.delta_total = self.delta_total.saturating_add(bytes);
        self.count = self.count.saturating_add(1);
        self.min = Some(self.min.map_or(bytes, |min| min.min(bytes)));
        self.max = self.max.max(bytes);
        self.histogram.record(bytes);
    }

    fn summary(&self, total_bytes: u64) -> TrafficSummary {
        let (p50_bytes, p99_bytes) = self.histogram.percentiles();
        TrafficSummary {
            total_bytes,
            messages: self.count,
            avg_bytes: self.delta_total.checked_div(self.count).unwrap_or(0),
            min_bytes: self.min.unwrap_or(0),
            max_bytes: self.max,
            p50_bytes,
            p99_bytes,
        }
    }
}

/// Accumulates a run's events. Mutated only by the orchestrator's event loop,
/// one event at a time.
#[derive(Debug, Clone)]
pub struct RunMetrics {
    scheduled: u64,
    connections: u64,
    disconnects: u64,
    failures: u64,
    read: u64,
    send: u64,
    tx: SizeStats,
    rx: SizeStats,
    errors: HashMap<String, u64>,
    started: Instant,
    established: Option<Duration>,
    stopped: Option<Duration>,
}

impl RunMetrics {
    /// Starts the clock for a run planning `scheduled` connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the size histograms cannot be created.
    pub fn new(scheduled: u64) -> AppResult<Self> {
        Ok(Self {
            scheduled,
            connections: 0,
            disconnects: 0,
            failures: 0,
            read: 0,
            send: 0,
            tx: SizeStats::new()?,
            rx: SizeStats::new()?,
            errors: HashMap::new(),
            started: Instant::now(),
            established: None,
            stopped: None,
        })
    }

    /// Routes one worker event to the matching counter.
    pub fn record(&mut self, event: &Event) {
        match event {
            Event::Open { .. } => self.handshaken(),
            Event::Message { read, .. } => self.message_received(*read),
            Event::Sent { send, .. } => self.message_sent(*send),
            Event::Close { read, send, .. } => self.close(*read, *send),
            Event::Disconnect { message, .. } => self.disconnect(message),
            Event::Error { message, .. } => self.error(message),
        }
    }

    pub const fn handshaken(&mut self) {
        self.connections = self.connections.saturating_add(1);
    }

    /// Adds a connection's cumulative byte counts.
    pub const fn close(&mut self, read: u64, send: u64) {
        self.read = self.read.saturating_add(read);
        self.send = self.send.saturating_add(send);
    }

    pub fn disconnect(&mut self, reason: &str) {
        self.disconnects = self.disconnects.saturating_add(1);
        self.tally(format!("{}{}", DISCONNECT_PREFIX, reason));
    }

    pub fn error(&mut self, message: &str) {
        self.failures = self.failures.saturating_add(1);
        self.tally(message.to_owned());
    }

    pub fn message_sent(&mut self, bytes: u64) {
        self.tx.record(bytes);
    }

    pub fn message_received(&mut self, bytes: u64) {
        self.rx.record(bytes);
    }

    fn tally(&mut self, message: String) {
        let count = self.errors.entry(message).or_insert(0);
        *count = count.saturating_add(1);
    }

    /// Marks the moment every ramp finished. Later calls are no-ops.
    pub fn established(&mut self) {
        if self.established.is_none() {
            self.established = Some(self.started.elapsed());
        }
    }

    /// Stops the clock. Later calls are no-ops.
    pub fn stop(&mut self) {
        if self.stopped.is_none() {
            self.stopped = Some(self.started.elapsed());
        }
    }

    #[must_use]
    pub const fn connections(&self) -> u64 {
        self.connections
    }

    #[must_use]
    pub fn summary(&self) -> MetricsSummary {
        let duration = self.stopped.unwrap_or_else(|| self.started.elapsed());
        let mut error_counts: Vec<ErrorCount> = self
            .errors
            .iter()
            .map(|(message, count)| ErrorCount {
                message: message.clone(),
                count: *count,
            })
            .collect();
        error_counts.sort_by(|left, right| {
            right
                .count
                .cmp(&left.count)
                .then_with(|| left.message.cmp(&right.message))
        });

        MetricsSummary {
            scheduled: self.scheduled,
            duration_ms: millis(duration),
            established_ms: self.established.map(millis),
            connected: self.connections,
            disconnected: self.disconnects,
            errors: self.failures,
            tx: self.tx.summary(self.send),
            rx: self.rx.summary(self.read),
            error_counts,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
