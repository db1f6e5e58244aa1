use crate::worker::protocol::{ConnectionId, Event};

/// Normal closure close code.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Reported when the transport ends without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Connecting,
    Open,
    Closing,
    Closed,
    Errored,
}

impl AgentState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            AgentState::Connecting => "connecting",
            AgentState::Open => "open",
            AgentState::Closing => "closing",
            AgentState::Closed => "closed",
            AgentState::Errored => "errored",
        }
    }
}

/// How a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The close handshake finished (or the peer sent a close frame) with `code`.
    Closed { code: u16, reason: String },
    /// Transport went away without a close frame.
    Abnormal,
    /// Connect, send, or read failed.
    Failed { message: String },
    /// Our close frame was never answered.
    CloseTimedOut,
    /// Shutdown arrived before the connection was attempted.
    Cancelled,
}

impl Termination {
    #[must_use]
    pub const fn final_state(&self) -> AgentState {
        match self {
            Termination::Failed { .. } => AgentState::Errored,
            Termination::Closed { .. }
            | Termination::Abnormal
            | Termination::CloseTimedOut
            | Termination::Cancelled => AgentState::Closed,
        }
    }
}

/// Terminal events for a connection. `Close` is always last; transport
/// failures never produce a `Disconnect`.
#[must_use]
pub fn termination_events(
    id: &ConnectionId,
    termination: Termination,
    read: u64,
    send: u64,
) -> Vec<Event> {
    let close = Event::Close {
        id: id.clone(),
        read,
        send,
    };
    match termination {
        Termination::Closed { code, .. } if code == NORMAL_CLOSURE => vec![close],
        Termination::Closed { code, reason } => vec![
            Event::Disconnect {
                id: id.clone(),
                message: disconnect_reason(code, reason),
            },
            close,
        ],
        Termination::Abnormal => vec![
            Event::Disconnect {
                id: id.clone(),
                message: disconnect_reason(ABNORMAL_CLOSURE, String::new()),
            },
            close,
        ],
        Termination::Failed { message } => vec![
            Event::Error {
                id: id.clone(),
                message,
            },
            close,
        ],
        Termination::CloseTimedOut | Termination::Cancelled => vec![close],
    }
}

fn disconnect_reason(code: u16, reason: String) -> String {
    if reason.is_empty() {
        format!("close code {}", code)
    } else {
        reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, AppResult};

    fn id() -> ConnectionId {
        ConnectionId::new("ws://localhost:9000", 7)
    }

    fn count(events: &[Event], kind: &str) -> usize {
        events.iter().filter(|event| event.kind() == kind).count()
    }

    #[test]
    fn normal_close_emits_only_close() -> AppResult<()> {
        let events = termination_events(
            &id(),
            Termination::Closed {
                code: NORMAL_CLOSURE,
                reason: String::new(),
            },
            10,
            20,
        );
        if events
            != vec![Event::Close {
                id: id(),
                read: 10,
                send: 20,
            }]
        {
            return Err(AppError::validation(format!("Unexpected events {:?}", events)));
        }
        Ok(())
    }

    #[test]
    fn abnormal_close_emits_disconnect_and_close() -> AppResult<()> {
        let events = termination_events(
            &id(),
            Termination::Closed {
                code: ABNORMAL_CLOSURE,
                reason: "abnormal".to_owned(),
            },
            0,
            0,
        );
        if count(&events, "close") != 1 || count(&events, "disconnect") != 1 {
            return Err(AppError::validation(format!("Unexpected events {:?}", events)));
        }
        match events.first() {
            Some(Event::Disconnect { message, .. }) if message == "abnormal" => {}
            other => {
                return Err(AppError::validation(format!(
                    "Expected disconnect first, got {:?}",
                    other
                )));
            }
        }
        if !matches!(events.last(), Some(Event::Close { .. })) {
            return Err(AppError::validation("Expected close to be last"));
        }
        Ok(())
    }

    #[test]
    fn missing_close_frame_is_reported_as_disconnect() -> AppResult<()> {
        let events = termination_events(&id(), Termination::Abnormal, 0, 0);
        match events.first() {
            Some(Event::Disconnect { message, .. }) if message == "close code 1006" => Ok(()),
            other => Err(AppError::validation(format!(
                "Unexpected first event {:?}",
                other
            ))),
        }
    }

    #[test]
    fn transport_error_never_emits_disconnect() -> AppResult<()> {
        let events = termination_events(
            &id(),
            Termination::Failed {
                message: "Connection reset by peer".to_owned(),
            },
            3,
            4,
        );
        if count(&events, "error") != 1
            || count(&events, "close") != 1
            || count(&events, "disconnect") != 0
        {
            return Err(AppError::validation(format!("Unexpected events {:?}", events)));
        }
        Ok(())
    }

    #[test]
    fn cancelled_connection_still_closes() -> AppResult<()> {
        let events = termination_events(&id(), Termination::Cancelled, 0, 0);
        if events.len() != 1 || count(&events, "close") != 1 {
            return Err(AppError::validation("Expected a lone close event"));
        }
        if Termination::Cancelled.final_state() != AgentState::Closed {
            return Err(AppError::validation("Expected cancelled agent to end closed"));
        }
        Ok(())
    }
}
