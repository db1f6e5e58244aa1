use std::collections::BTreeMap;

use crate::metrics::metric_key;
use crate::worker::protocol::Event;

pub const SOCKET_OPEN: &str = "socket_open";
pub const SOCKET_CLOSED: &str = "socket_closed";
pub const SOCKET_DISCONNECT: &str = "socket_disconnect";
pub const SOCKET_ERROR: &str = "socket_error";
pub const MESSAGE_SENT: &str = "message_sent";
pub const MESSAGE_RECEIVED: &str = "message_received";
pub const TX_SIZE: &str = "tx_size";
pub const RX_SIZE: &str = "rx_size";

/// Running aggregate of one measured value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Measure {
    pub count: u64,
    pub sum: u64,
    pub min: u64,
    pub max: u64,
}

impl Measure {
    fn observe(&mut self, value: u64) {
        self.min = if self.count == 0 {
            value
        } else {
            self.min.min(value)
        };
        self.max = self.max.max(value);
        self.count = self.count.saturating_add(1);
        self.sum = self.sum.saturating_add(value);
    }
}

/// Push-style counters keyed by event type. Failure counters carry the
/// message as a dotted suffix, e.g. `socket_error.connection_refused`.
#[derive(Debug, Clone, Default)]
pub struct EventCounters {
    counters: BTreeMap<String, u64>,
    measures: BTreeMap<String, Measure>,
}

impl EventCounters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, name: &str, by: u64) {
        let counter = self.counters.entry(name.to_owned()).or_insert(0);
        *counter = counter.saturating_add(by);
    }

    pub fn measure(&mut self, name: &str, value: u64) {
        self.measures
            .entry(name.to_owned())
            .or_default()
            .observe(value);
    }

    pub fn record(&mut self, event: &Event) {
        match event {
            Event::Open { .. } => self.increment(SOCKET_OPEN, 1),
            Event::Close { .. } => self.increment(SOCKET_CLOSED, 1),
            Event::Disconnect { message, .. } => self.increment(
                &format!("{}.{}", SOCKET_DISCONNECT, metric_key(message)),
                1,
            ),
            Event::Error { message, .. } => {
                self.increment(&format!("{}.{}", SOCKET_ERROR, metric_key(message)), 1);
            }
            Event::Sent { send, .. } => {
                self.increment(MESSAGE_SENT, 1);
                self.measure(TX_SIZE, *send);
            }
            Event::Message { read, .. } => {
                self.increment(MESSAGE_RECEIVED, 1);
                self.measure(RX_SIZE, *read);
            }
        }
    }

    #[must_use]
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn measured(&self, name: &str) -> Option<Measure> {
        self.measures.get(name).copied()
    }

    pub(super) fn counters(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counters
            .iter()
            .map(|(name, value)| (name.as_str(), *value))
    }

    pub(super) fn measures(&self) -> impl Iterator<Item = (&str, Measure)> {
        self.measures
            .iter()
            .map(|(name, measure)| (name.as_str(), *measure))
    }
}
