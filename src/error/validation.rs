use thiserror::Error;

#[derive(Debug, Error, Clone, Copy)]
pub enum BoundsPart {
    #[error("first")]
    First,
    #[error("second")]
    Second,
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error(
        "Missing target URLs. Pass one or more ws:// or wss:// endpoints, e.g. `sockme ws://localhost:8080`."
    )]
    MissingUrls,
    #[error("Invalid URL '{value}': {source}")]
    InvalidUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Unsupported URL scheme '{scheme}' in '{value}'. Use ws:// or wss://.")]
    UnsupportedScheme { value: String, scheme: String },
    #[error("Invalid boolean '{value}'. Expected true/false, yes/no, on/off, or 1/0.")]
    InvalidBoolean { value: String },
    #[error("Invalid range '{value}'. Expected 'a,b' (e.g. 1,1024).")]
    InvalidBoundsFormat { value: String },
    #[error("Invalid {part} value in range '{value}': {source}")]
    InvalidBoundsNumber {
        value: String,
        part: BoundsPart,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("Duration must not be empty.")]
    DurationEmpty,
    #[error("Invalid duration '{value}'.")]
    InvalidDurationFormat { value: String },
    #[error("Invalid duration '{value}': {source}")]
    InvalidDurationNumber {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("Duration overflow.")]
    DurationOverflow,
    #[error("Invalid duration unit '{unit}'.")]
    InvalidDurationUnit { unit: String },
    #[error("Duration must be > 0.")]
    DurationZero,
    #[error("Payload size {value} for '{field}' exceeds the {max} byte message limit.")]
    PayloadTooLarge {
        field: &'static str,
        value: u64,
        max: u64,
    },
    #[error("Value must be >= {min}.")]
    ValueTooSmall { min: u64 },
    #[error("Invalid value: {source}")]
    InvalidNumber {
        #[source]
        source: std::num::ParseIntError,
    },
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
