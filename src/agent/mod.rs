//! One connection's lifecycle: connect, send loop, receive, classify the end.
mod bytes;
mod connect;
mod state;


use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use crate::args::Bounds;
use crate::generator::{MessageGenerator, PayloadCache};
use crate::worker::protocol::{ConnectionTask, Event};

pub use bytes::{ByteCounters, ByteTally, CountingStream};
pub use connect::ConnectError;
pub use state::{ABNORMAL_CLOSURE, AgentState, NORMAL_CLOSURE, Termination, termination_events};

/// Longest a close handshake may take before the agent gives up on it. Workers
/// shorten this so every close is reported inside the drain timeout.
pub const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-worker resources shared by every agent the worker hosts.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub cache: Arc<PayloadCache>,
    pub events: mpsc::UnboundedSender<Event>,
    pub connect_timeout: Duration,
    pub close_timeout: Duration,
}

impl AgentContext {
    fn emit(&self, event: Event) {
        if self.events.send(event).is_err() {
            tracing::debug!("Event channel closed; dropping agent event");
        }
    }
}

/// Drives one connection to completion. Every admitted task ends with exactly
/// one `close` event, whatever happens along the way.
pub async fn run_agent(task: ConnectionTask, ctx: AgentContext, stop: watch::Receiver<bool>) {
    let counters = Arc::new(ByteCounters::default());
    let termination = drive(&task, &ctx, &counters, stop).await;
    tracing::debug!(
        "Connection {} ended ({}): {:?}",
        task.id,
        termination.final_state().as_str(),
        termination
    );
    for event in termination_events(&task.id, termination, counters.read(), counters.written())
    {
        ctx.emit(event);
    }
}

async fn drive(
    task: &ConnectionTask,
    ctx: &AgentContext,
    counters: &Arc<ByteCounters>,
    mut stop: watch::Receiver<bool>,
) -> Termination {
    if *stop.borrow_and_update() {
        return Termination::Cancelled;
    }
    if task.wsoptions.per_message_deflate {
        tracing::debug!(
            "perMessageDeflate requested for {} but is not supported; continuing without it",
            task.id
        );
    }

    let started = Instant::now();
    let socket = match connect::connect(&task.url, &task.wsoptions, counters, ctx.connect_timeout)
        .await
    {
        Ok(socket) => socket,
        Err(err) => {
            return Termination::Failed {
                message: err.to_string(),
            };
        }
    };
    let duration = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    ctx.emit(Event::Open {
        id: task.id.clone(),
        duration,
    });

    let (mut sink, mut stream) = socket.split();
    let mut state = AgentState::Open;
    // Handshake bytes stay out of the per-message deltas.
    let mut tally = ByteTally::starting_at(counters.read(), counters.written());
    let mut generator = MessageGenerator::new(Arc::clone(&ctx.cache));
    let mut rng = StdRng::from_entropy();
    let mut peer_close: Option<(u16, String)> = None;

    let send_timer = sleep(Duration::ZERO);
    tokio::pin!(send_timer);
    let close_deadline = sleep(ctx.close_timeout);
    tokio::pin!(close_deadline);

    loop {
        tokio::select! {
            _ = stop.changed(), if state == AgentState::Open => {
                state = AgentState::Closing;
                close_deadline.as_mut().reset(Instant::now() + ctx.close_timeout);
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: Cow::Borrowed(""),
                };
                if let Err(err) = sink.send(Message::Close(Some(frame))).await {
                    return classify_error(err, peer_close);
                }
            }
            () = &mut send_timer, if state == AgentState::Open => {
                let size = message_size(task, &mut rng);
                let message = match generator.generate(size) {
                    Ok(message) => message,
                    Err(err) => {
                        return Termination::Failed {
                            message: err.to_string(),
                        };
                    }
                };
                if let Err(err) = sink.send(Message::Text(message)).await {
                    return classify_error(err, peer_close);
                }
                ctx.emit(Event::Sent {
                    id: task.id.clone(),
                    send: tally.written_delta(counters.written()),
                });
                let delay = Duration::from_millis(sample(task.frequency, &mut rng));
                send_timer.as_mut().reset(Instant::now() + delay);
            }
            () = &mut close_deadline, if state == AgentState::Closing => {
                return Termination::CloseTimedOut;
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                    ctx.emit(Event::Message {
                        id: task.id.clone(),
                        read: tally.read_delta(counters.read()),
                    });
                }
                Some(Ok(Message::Close(close))) => {
                    peer_close = Some(close.map_or((NORMAL_CLOSURE, String::new()), |close| {
                        (u16::from(close.code), close.reason.into_owned())
                    }));
                    if state == AgentState::Open {
                        state = AgentState::Closing;
                        close_deadline.as_mut().reset(Instant::now() + ctx.close_timeout);
                    }
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Err(err)) => return classify_error(err, peer_close),
                None => return closed(peer_close),
            },
        }
    }
}

fn closed(peer_close: Option<(u16, String)>) -> Termination {
    match peer_close {
        Some((code, reason)) => Termination::Closed { code, reason },
        None => Termination::Abnormal,
    }
}

fn classify_error(err: WsError, peer_close: Option<(u16, String)>) -> Termination {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => closed(peer_close),
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => Termination::Abnormal,
        other => Termination::Failed {
            message: other.to_string(),
        },
    }
}

fn message_size(task: &ConnectionTask, rng: &mut StdRng) -> usize {
    let size = task.buffer.unwrap_or_else(|| sample(task.payload, rng));
    usize::try_from(size).unwrap_or(usize::MAX)
}

fn sample(range: Bounds, rng: &mut StdRng) -> u64 {
    rng.gen_range(range.low()..=range.high())
}

#[cfg(test)]
pub(crate) fn test_task(url: &str, ordinal: u64) -> ConnectionTask {
    use crate::worker::protocol::{ConnectionId, WsOptions};
    ConnectionTask {
        url: url.to_owned(),
        frequency: Bounds::new(10, 20),
        payload: Bounds::new(16, 32),
        buffer: None,
        wsoptions: WsOptions::default(),
        id: ConnectionId::new(url, ordinal),
    }
}
