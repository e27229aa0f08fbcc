use thiserror::Error;

use sparkplug_sse::SseError;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Backend returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Session has not been bootstrapped")]
    NotBootstrapped,

    #[error("Session is already streaming")]
    AlreadyStreaming,

    #[error("Session is closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SseError> for MonitorError {
    fn from(err: SseError) -> Self {
        match err {
            SseError::Status { status, message } => MonitorError::Api { status, message },
            SseError::Parse(message) => MonitorError::Parse(message),
            SseError::Stream(message) => MonitorError::Stream(message),
            other => MonitorError::Transport(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        MonitorError::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
