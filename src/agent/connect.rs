use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, client_async_tls_with_config};
use url::Url;

use super::bytes::{ByteCounters, CountingStream};
use crate::worker::protocol::WsOptions;

pub type AgentSocket = WebSocketStream<MaybeTlsStream<CountingStream<TcpStream>>>;

/// Anything that keeps a connection from opening. Rendered verbatim into the
/// `error` event.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("URL '{url}' has no host or port")]
    MissingAddress { url: String },
    #[error("Invalid subprotocol header: {source}")]
    Protocol {
        #[source]
        source: InvalidHeaderValue,
    },
    #[error("{source}")]
    Tcp {
        #[source]
        source: std::io::Error,
    },
    #[error("{source}")]
    Handshake {
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[error("Connect timed out after {}ms", timeout.as_millis())]
    Timeout { timeout: Duration },
}

/// Opens the TCP stream and performs the WebSocket (and TLS for `wss://`)
/// handshake within `timeout`.
///
/// # Errors
///
/// Returns an error when the URL is unusable, the TCP connect or handshake
/// fails, or the deadline passes.
pub async fn connect(
    url: &str,
    options: &WsOptions,
    counters: &Arc<ByteCounters>,
    timeout: Duration,
) -> Result<AgentSocket, ConnectError> {
    tokio::time::timeout(timeout, open(url, options, counters))
        .await
        .map_err(|_elapsed| ConnectError::Timeout { timeout })?
}

async fn open(
    url: &str,
    options: &WsOptions,
    counters: &Arc<ByteCounters>,
) -> Result<AgentSocket, ConnectError> {
    let parsed = Url::parse(url).map_err(|err| ConnectError::InvalidUrl {
        url: url.to_owned(),
        source: err,
    })?;
    let (host, port) = parsed
        .host_str()
        .zip(parsed.port_or_known_default())
        .ok_or_else(|| ConnectError::MissingAddress {
            url: url.to_owned(),
        })?;
    let host = host.trim_start_matches('[').trim_end_matches(']');

    let mut request = url
        .into_client_request()
        .map_err(|err| ConnectError::Handshake { source: err })?;
    if let Some(protocol) = options.protocol.as_deref() {
        let value =
            HeaderValue::from_str(protocol).map_err(|err| ConnectError::Protocol { source: err })?;
        request.headers_mut().insert("Sec-WebSocket-Protocol", value);
    }

    let tcp = TcpStream::connect((host, port))
        .await
        .map_err(|err| ConnectError::Tcp { source: err })?;
    if let Err(err) = tcp.set_nodelay(true) {
        tracing::debug!("Failed to set TCP_NODELAY for {}: {}", url, err);
    }
    let stream = CountingStream::new(tcp, Arc::clone(counters));

    let (socket, _response) = client_async_tls_with_config(request, stream, None, None)
        .await
        .map_err(|err| ConnectError::Handshake { source: err })?;
    Ok(socket)
}
