//! Scheduling Core Error Types

use errors::{ErrorCategory, FieldError, FieldErrorTrait};
use thiserror::Error;

/// Result type for scheduling operations
pub type Result<T> = std::result::Result<T, ScheduleError>;

/// Scheduling core errors
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Ledger file exists but cannot be decoded
    #[error("Ledger corrupt: {0}")]
    Corrupt(String),

    /// Ledger written by a newer release
    #[error("Unsupported ledger version: {0}")]
    UnsupportedVersion(u32),

    /// Ledger could not be written back
    #[error("Ledger write failed: {0}")]
    Write(String),

    /// Trigger text could not be parsed
    #[error("Invalid trigger: {0}")]
    InvalidTrigger(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for ScheduleError {
    fn from(err: serde_json::Error) -> Self {
        ScheduleError::SerializationError(err.to_string())
    }
}

impl FieldErrorTrait for ScheduleError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Corrupt(_) => "LEDGER_CORRUPT",
            Self::UnsupportedVersion(_) => "LEDGER_VERSION",
            Self::Write(_) => "LEDGER_WRITE",
            Self::InvalidTrigger(_) => "INVALID_TRIGGER",
            Self::SerializationError(_) => "SERIALIZATION_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Corrupt(_) | Self::UnsupportedVersion(_) => ErrorCategory::ScheduleCorruption,
            Self::InvalidTrigger(_) => ErrorCategory::Configuration,
            Self::Write(_) | Self::SerializationError(_) => ErrorCategory::Internal,
        }
    }
}

impl From<ScheduleError> for FieldError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::Corrupt(msg) => FieldError::LedgerCorrupt(msg),
            ScheduleError::UnsupportedVersion(v) => {
                FieldError::LedgerCorrupt(format!("unsupported version {}", v))
            },
            ScheduleError::Write(msg) => FieldError::LedgerWrite(msg),
            ScheduleError::InvalidTrigger(msg) => FieldError::invalid_config("trigger", msg),
            ScheduleError::SerializationError(msg) => FieldError::Serialization(msg),
        }
    }
}
