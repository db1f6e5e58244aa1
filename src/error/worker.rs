use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Failed to spawn worker {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("Worker {index} is missing its {stream} pipe.")]
    MissingPipe { index: usize, stream: &'static str },
    #[error("Failed to resolve the current executable: {source}")]
    CurrentExe {
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error during {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("Wire message exceeded max size ({max_bytes} bytes).")]
    WireMessageTooLarge { max_bytes: usize },
    #[error("Wire message was not valid UTF-8: {source}")]
    WireMessageInvalidUtf8 {
        #[source]
        source: std::str::Utf8Error,
    },
    #[error("Serialization error during {context}: {source}")]
    Serialize {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("Deserialization error during {context}: {source}")]
    Deserialize {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("Worker {index} control channel closed.")]
    ControlChannelClosed { index: usize },
    #[error("No workers available for dispatch.")]
    NoWorkers,
    #[cfg(test)]
    #[error("Test expectation failed: {message}")]
    TestExpectation { message: &'static str },
    #[cfg(test)]
    #[error("Test expectation failed: {message}: {value}")]
    TestExpectationValue {
        message: &'static str,
        value: String,
    },
}
