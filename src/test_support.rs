//! Shared helpers for async unit tests: a runtime wrapper and small local
//! WebSocket servers with scripted behavior.
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use crate::error::{AppError, AppResult};

pub(crate) const TEST_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn run_async_test<F>(future: F) -> AppResult<()>
where
    F: Future<Output = AppResult<()>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::validation(format!("Failed to build runtime: {}", err)))?;
    runtime.block_on(future)
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum ServerBehavior {
    /// Echo text and binary frames until the client closes.
    Echo,
    /// Close with the given code after the first message.
    CloseAfterFirst(u16),
    /// Drop the TCP stream after the first message without a close frame.
    DropAfterFirst,
    /// Finish the handshake, then hold the socket without ever reading it.
    IgnoreClose,
}

/// Binds a local server and returns its `ws://` URL.
pub(crate) async fn spawn_ws_server(
    behavior: ServerBehavior,
) -> AppResult<(String, JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr: SocketAddr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        while let Ok((stream, _peer)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                match behavior {
                    ServerBehavior::Echo => {
                        while let Some(Ok(message)) = ws.next().await {
                            if (message.is_text() || message.is_binary())
                                && ws.send(message).await.is_err()
                            {
                                break;
                            }
                        }
                    }
                    ServerBehavior::CloseAfterFirst(code) => {
                        if ws.next().await.is_none() {
                            return;
                        }
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: "going away".into(),
                        };
                        if ws.send(Message::Close(Some(frame))).await.is_err() {
                            return;
                        }
                        while let Some(Ok(_)) = ws.next().await {}
                    }
                    ServerBehavior::DropAfterFirst => {
                        let _first = ws.next().await;
                        drop(ws);
                    }
                    ServerBehavior::IgnoreClose => {
                        tokio::time::sleep(TEST_TIMEOUT).await;
                        drop(ws);
                    }
                }
            });
        }
    });
    Ok((format!("ws://{}", addr), handle))
}

/// A `ws://` URL nothing listens on.
pub(crate) async fn refused_url() -> AppResult<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("ws://{}", addr))
}
