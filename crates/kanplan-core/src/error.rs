//! Core error types for kanplan-core.
//!
//! Scheduling failures are scoped to one task (or one day of availability);
//! nothing here is fatal to the process. Storage, configuration and
//! validation errors are collected under [`CoreError`].

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for kanplan-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Scheduling-related errors
    #[error("Scheduling error: {0}")]
    Schedule(#[from] ScheduleError),

    /// Persistent store errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Calendar provider errors outside of availability queries
    #[error("Calendar provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Task lookup failed
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures of a single estimation/allocation request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScheduleError {
    /// Allocation requested for a task without a deadline.
    #[error("Task '{task_id}' has no deadline")]
    MissingDeadline { task_id: String },

    /// Not enough free time before the deadline.
    #[error(
        "Not enough free time for task '{task_id}': {required_minutes} min required, \
         {available_minutes} min available"
    )]
    CapacityExceeded {
        task_id: String,
        required_minutes: i64,
        available_minutes: i64,
    },

    /// Calendar query or mutation failed.
    #[error("Calendar provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Phase minutes do not add up to the total.
    #[error("Invalid estimation: phases sum to {phase_sum} min but total is {total} min")]
    InvalidEstimation { phase_sum: u32, total: u32 },
}

impl ScheduleError {
    /// Whether the rescheduler may try to recover by relaxing constraints.
    pub fn is_relaxable(&self) -> bool {
        matches!(self, ScheduleError::CapacityExceeded { .. })
    }

    /// Minutes missing for a `CapacityExceeded` failure.
    pub fn shortfall_minutes(&self) -> Option<i64> {
        match self {
            ScheduleError::CapacityExceeded {
                required_minutes,
                available_minutes,
                ..
            } => Some((required_minutes - available_minutes).max(0)),
            _ => None,
        }
    }
}

/// Calendar provider failure.
///
/// Every provider error collapses into a single "unavailable" condition;
/// callers decide whether to degrade or propagate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("calendar provider unavailable: {0}")]
    Unavailable(String),
}

impl From<ProviderError> for ScheduleError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Unavailable(reason) => ScheduleError::ProviderUnavailable(reason),
        }
    }
}

/// Persistent store errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open the backing database
    #[error("Failed to open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Store is locked
    #[error("Store is locked")]
    Locked,

    /// Stored blob could not be decoded
    #[error("Corrupt value under key '{key}': {message}")]
    Corrupt { key: String, message: String },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Data directory could not be determined or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Invalid time range
    #[error("Invalid time range: end ({end}) must be greater than start ({start})")]
    InvalidTimeRange {
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    },

    /// Enabled working day whose start is not before its end
    #[error("Invalid working hours for {day}: start {start} must be before end {end}")]
    InvalidWorkingHours {
        day: chrono::Weekday,
        start: chrono::NaiveTime,
        end: chrono::NaiveTime,
    },

    /// Status change not permitted
    #[error("Cannot move task from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _msg) => {
                if code.code == rusqlite::ErrorCode::DatabaseLocked
                    || code.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    StorageError::Locked
                } else {
                    StorageError::QueryFailed(err.to_string())
                }
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_message_reports_shortfall() {
        let err = ScheduleError::CapacityExceeded {
            task_id: "t1".into(),
            required_minutes: 60,
            available_minutes: 20,
        };
        assert!(err.to_string().contains("60 min required"));
        assert_eq!(err.shortfall_minutes(), Some(40));
        assert!(err.is_relaxable());
        assert!(!ScheduleError::MissingDeadline { task_id: "t1".into() }.is_relaxable());
    }

    #[test]
    fn provider_error_maps_to_unavailable() {
        let err: ScheduleError = ProviderError::Unavailable("timeout".into()).into();
        assert_eq!(err, ScheduleError::ProviderUnavailable("timeout".into()));
    }
}
