//! Error types for Health Sync

use chrono::NaiveDate;
use thiserror::Error;

/// Errors raised by a raw health record source
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Health record source is not available on this device")]
    Unavailable,

    #[error("Permission to read health records was denied")]
    PermissionDenied,

    #[error("Failed to read health records: {0}")]
    Read(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while talking to the remote health service
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Server rejected the record: {0}")]
    Rejected(String),

    #[error("Failed to decode server response: {0}")]
    Decode(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("Record for {0} has no user id")]
    MissingUserId(NaiveDate),
}

impl ApiError {
    /// Whether the error means the request ran out of time
    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Timeout)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_connect() {
            ApiError::Connect(e.to_string())
        } else if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else if e.is_builder() {
            ApiError::Client(e.to_string())
        } else if let Some(status) = e.status() {
            ApiError::Status {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

/// Top-level errors for aggregation and sync operations
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Invalid date range: {start} is after {end}")]
    InvalidDateRange { start: String, end: String },

    #[error("Date parse error: {0}")]
    DateParseError(String),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}
