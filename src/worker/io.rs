use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{AppError, AppResult, WorkerError};

/// Upper bound for a single newline-delimited message.
pub const MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

/// Reads one newline-delimited JSON message. Returns `None` once the peer has
/// closed its end.
///
/// # Errors
///
/// Returns an error when the read fails, the line is too large, or it does not
/// decode into `T`.
pub async fn read_message<R, T>(reader: &mut R) -> AppResult<Option<T>>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut buffer: Vec<u8> = Vec::with_capacity(256);
    let bytes = reader.read_until(b'\n', &mut buffer).await.map_err(|err| {
        AppError::worker(WorkerError::Io {
            context: "read wire message",
            source: err,
        })
    })?;
    if bytes == 0 {
        return Ok(None);
    }
    if buffer.len() > MAX_MESSAGE_BYTES {
        return Err(AppError::worker(WorkerError::WireMessageTooLarge {
            max_bytes: MAX_MESSAGE_BYTES,
        }));
    }
    if buffer.ends_with(b"\n") {
        buffer.pop();
        if buffer.ends_with(b"\r") {
            buffer.pop();
        }
    }
    let line = std::str::from_utf8(&buffer)
        .map_err(|err| AppError::worker(WorkerError::WireMessageInvalidUtf8 { source: err }))?;
    serde_json::from_str::<T>(line)
        .map(Some)
        .map_err(|err| {
            AppError::worker(WorkerError::Deserialize {
                context: "wire message",
                source: err,
            })
        })
}

/// Writes one message as a JSON line and flushes it.
///
/// # Errors
///
/// Returns an error when serialization or the write fails.
pub async fn send_message<W, T>(writer: &mut W, message: &T) -> AppResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut payload = serde_json::to_string(message).map_err(|err| {
        AppError::worker(WorkerError::Serialize {
            context: "wire message",
            source: err,
        })
    })?;
    payload.push('\n');
    writer.write_all(payload.as_bytes()).await.map_err(|err| {
        AppError::worker(WorkerError::Io {
            context: "send wire message",
            source: err,
        })
    })?;
    writer.flush().await.map_err(|err| {
        AppError::worker(WorkerError::Io {
            context: "flush wire message",
            source: err,
        })
    })
}
