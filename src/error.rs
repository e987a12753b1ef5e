//! Error types for the OGM monitor.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Command `{cmd}`: {reason}")]
    Command { cmd: String, reason: String },

    #[error("Command `{0}` timed out")]
    Timeout(String),

    #[error("Lock: {0}")]
    Lock(String),
}

impl From<tempfile::PersistError> for MonitorError {
    fn from(e: tempfile::PersistError) -> Self {
        Self::Io(e.error)
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
