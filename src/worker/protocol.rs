use serde::{Deserialize, Serialize};

use crate::args::Bounds;

/// `url::ordinal`, unique within a run and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    #[must_use]
    pub fn new(url: &str, ordinal: u64) -> Self {
        Self(format!("{}::{}", url, ordinal))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WsOptions {
    pub protocol: Option<String>,
    #[serde(rename = "perMessageDeflate", default)]
    pub per_message_deflate: bool,
}

/// Everything a worker needs to open and drive one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTask {
    pub url: String,
    pub frequency: Bounds,
    pub payload: Bounds,
    pub buffer: Option<u64>,
    pub wsoptions: WsOptions,
    pub id: ConnectionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownMessage {
    pub shutdown: bool,
}

/// Orchestrator to worker. The two shapes are told apart by their fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlMessage {
    Shutdown(ShutdownMessage),
    Task(ConnectionTask),
}

impl ControlMessage {
    #[must_use]
    pub const fn shutdown() -> Self {
        ControlMessage::Shutdown(ShutdownMessage { shutdown: true })
    }
}

/// Worker to orchestrator. Byte counts on `message` and `sent` are deltas since
/// the previous event of the same kind; on `close` they are connection totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Open { id: ConnectionId, duration: u64 },
    Message { id: ConnectionId, read: u64 },
    Sent { id: ConnectionId, send: u64 },
    Close { id: ConnectionId, read: u64, send: u64 },
    Disconnect { id: ConnectionId, message: String },
    Error { id: ConnectionId, message: String },
}

impl Event {
    #[must_use]
    pub const fn id(&self) -> &ConnectionId {
        match self {
            Event::Open { id, .. }
            | Event::Message { id, .. }
            | Event::Sent { id, .. }
            | Event::Close { id, .. }
            | Event::Disconnect { id, .. }
            | Event::Error { id, .. } => id,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Event::Open { .. } => "open",
            Event::Message { .. } => "message",
            Event::Sent { .. } => "sent",
            Event::Close { .. } => "close",
            Event::Disconnect { .. } => "disconnect",
            Event::Error { .. } => "error",
        }
    }
}
