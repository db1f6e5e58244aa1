//! Metrics-reporting sink: event counters and their Prometheus export.
mod counters;
mod format;
mod prometheus;


pub use counters::{
    EventCounters, MESSAGE_RECEIVED, MESSAGE_SENT, Measure, RX_SIZE, SOCKET_CLOSED,
    SOCKET_DISCONNECT, SOCKET_ERROR, SOCKET_OPEN, TX_SIZE,
};
