//! Message payloads for the send loop.
//!
//! Each worker owns one [`PayloadCache`]; every connection gets its own
//! [`MessageGenerator`] on top of it, so ids are per connection while filler
//! buffers are shared by every connection in the worker.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::error::{AppError, AppResult, ConfigError, WorkerError};

/// Byte used to fill generated payloads.
const FILLER: char = 'f';

/// Text loaded from a `--generator` file. Payloads repeat it up to the
/// requested size instead of using the plain filler byte.
#[derive(Debug, Clone)]
pub struct PayloadSource {
    path: PathBuf,
    text: Arc<str>,
}

impl PayloadSource {
    /// Reads `path`, dropping trailing line endings.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or holds no text.
    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            AppError::config(ConfigError::ReadGenerator {
                path: path.to_path_buf(),
                source: err,
            })
        })?;
        let text = raw.trim_end_matches(['\r', '\n']);
        if text.is_empty() {
            return Err(AppError::config(ConfigError::EmptyGenerator {
                path: path.to_path_buf(),
            }));
        }
        Ok(Self {
            path: path.to_path_buf(),
            text: Arc::from(text),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Size-keyed store of filler payloads. Append-only for the worker's lifetime.
#[derive(Debug, Default)]
pub struct PayloadCache {
    buffers: Mutex<HashMap<usize, Arc<str>>>,
    source: Option<PayloadSource>,
}

impl PayloadCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_source(source: Option<PayloadSource>) -> Self {
        Self {
            buffers: Mutex::default(),
            source,
        }
    }

    /// Returns the filler payload for `size`, allocating it on first request.
    #[must_use]
    pub fn payload(&self, size: usize) -> Arc<str> {
        let mut buffers = self.buffers.lock().unwrap_or_else(PoisonError::into_inner);
        buffers
            .entry(size)
            .or_insert_with(|| Arc::from(filler(size, self.source.as_ref().map(PayloadSource::text))))
            .clone()
    }

    /// Number of distinct sizes cached so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exactly `size` bytes: whole characters of `source` repeated while they
/// fit, padded with the filler byte.
fn filler(size: usize, source: Option<&str>) -> String {
    let mut buffer = String::with_capacity(size);
    if let Some(text) = source.filter(|text| !text.is_empty()) {
        for ch in text.chars().cycle() {
            if buffer.len().saturating_add(ch.len_utf8()) > size {
                break;
            }
            buffer.push(ch);
        }
    }
    while buffer.len() < size {
        buffer.push(FILLER);
    }
    buffer
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    id: u64,
    data: &'a str,
}

/// Builds the `{"id":n,"data":"..."}` envelope sent over a connection.
#[derive(Debug)]
pub struct MessageGenerator {
    cache: Arc<PayloadCache>,
    next_id: u64,
}

impl MessageGenerator {
    #[must_use]
    pub const fn new(cache: Arc<PayloadCache>) -> Self {
        Self { cache, next_id: 0 }
    }

    /// Produces the next message with a payload of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error when the envelope cannot be serialized.
    pub fn generate(&mut self, size: usize) -> AppResult<String> {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        let data = self.cache.payload(size);
        serde_json::to_string(&Envelope { id, data: &data }).map_err(|err| {
            AppError::worker(WorkerError::Serialize {
                context: "message envelope",
                source: err,
            })
        })
    }
}
