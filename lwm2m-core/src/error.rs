use thiserror::Error;

/// Main error type for LWM2M operations
#[derive(Error, Debug)]
pub enum Lwm2mError {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Invalid path value: {0}")]
    PathInvalidValue(String),

    #[error("Path field absent: {0}")]
    FieldAbsent(&'static str),

    #[error("Not enough data: need {needed}, have {available}")]
    NotEnoughData { needed: usize, available: usize },

    #[error("Invalid length {actual} for {expected}")]
    InvalidLength { expected: &'static str, actual: usize },

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Content format not supported: {0}")]
    ContentFormatNotSupported(u16),

    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("Not found")]
    NotFound,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Unexpected response code: expected {expected}, got {actual}")]
    UnexpectedResponseCode { expected: String, actual: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timeout")]
    Timeout,
}

/// Result type alias for LWM2M operations
pub type Lwm2mResult<T> = Result<T, Lwm2mError>;
