//! Unified error handling for the EDS field unit
//!
//! Every crate in the workspace reports failures through [`FieldError`] or a
//! domain error that implements [`FieldErrorTrait`]. The orchestration loop
//! uses the category to decide how a failure is surfaced: sensor, actuator and
//! persistence problems become fault tokens, anything else is fatal for the tick.

use thiserror::Error;

// ============================================================================
// FieldError - Main error type
// ============================================================================

/// Main error type for the field unit
#[derive(Debug, Error)]
pub enum FieldError {
    // ======================================
    // Configuration Errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // ======================================
    // Sensor Errors
    // ======================================
    #[error("Sensor {sensor} unavailable: {reason}")]
    Sensor { sensor: String, reason: String },

    #[error("Clock error: {0}")]
    Clock(String),

    // ======================================
    // Actuator Errors
    // ======================================
    #[error("Actuator {target} failed: {reason}")]
    Actuator { target: String, reason: String },

    // ======================================
    // Persistence Errors
    // ======================================
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Ledger corrupt: {0}")]
    LedgerCorrupt(String),

    #[error("Ledger write failed: {0}")]
    LedgerWrite(String),

    // ======================================
    // Serialization & IO
    // ======================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // ======================================
    // System
    // ======================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using FieldError
pub type FieldResult<T> = Result<T, FieldError>;

impl FieldError {
    /// Sensor failure for a named probe
    pub fn sensor(sensor: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Sensor {
            sensor: sensor.into(),
            reason: reason.into(),
        }
    }

    /// Actuator failure for a named relay line or panel
    pub fn actuator(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Actuator {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Invalid configuration value
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// Conversion traits for common error types
impl From<serde_json::Error> for FieldError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for FieldError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Deserialization(err.to_string())
    }
}

// ============================================================================
// FieldError implements FieldErrorTrait
// ============================================================================

impl FieldErrorTrait for FieldError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::Sensor { .. } => "SENSOR_ERROR",
            Self::Clock(_) => "CLOCK_ERROR",
            Self::Actuator { .. } => "ACTUATOR_ERROR",
            Self::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
            Self::LedgerCorrupt(_) => "LEDGER_CORRUPT",
            Self::LedgerWrite(_) => "LEDGER_WRITE",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Deserialization(_) => "DESERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Other(_) => "UNKNOWN_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::InvalidConfig { .. } => ErrorCategory::Configuration,
            Self::Sensor { .. } | Self::Clock(_) => ErrorCategory::Sensor,
            Self::Actuator { .. } => ErrorCategory::Actuator,
            Self::StorageUnavailable(_) | Self::Persistence(_) => ErrorCategory::Persistence,
            Self::LedgerCorrupt(_) => ErrorCategory::ScheduleCorruption,
            // The ledger lives on internal storage; failing to write it is unexpected
            Self::LedgerWrite(_)
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Deserialization(_)
            | Self::Internal(_) => ErrorCategory::Internal,
            Self::Other(_) => ErrorCategory::Unknown,
        }
    }
}

// ============================================================================
// Field unit error trait - Architectural layer
// ============================================================================

/// Error category enum - used for fault classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    // Hardware collaborators
    Sensor,
    Actuator,
    Persistence,

    // Scheduling state
    ScheduleCorruption,

    // Startup
    Configuration,

    // System level
    Internal,
    Unknown,
}

/// Error capability trait
///
/// Domain crates keep their own error enums (e.g. the scheduling core's
/// `ScheduleError`) and gain a common interface by implementing this trait.
pub trait FieldErrorTrait: std::error::Error + Send + Sync + 'static {
    /// Get error code (for logs)
    fn error_code(&self) -> &'static str;

    /// Get error category
    fn category(&self) -> ErrorCategory;

    /// Whether an escaped error should stop the loop under `halt_on_fatal`
    fn is_fatal(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Internal | ErrorCategory::Unknown
        )
    }

    /// Get log level
    fn log_level(&self) -> tracing::Level {
        use tracing::Level;
        match self.category() {
            ErrorCategory::Internal | ErrorCategory::Unknown => Level::ERROR,
            ErrorCategory::ScheduleCorruption | ErrorCategory::Configuration => Level::ERROR,
            ErrorCategory::Sensor | ErrorCategory::Actuator | ErrorCategory::Persistence => {
                Level::WARN
            },
        }
    }
}
