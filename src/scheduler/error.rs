//! Error types for the scheduler module

use std::fmt;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Trigger configuration error
    TriggerConfigError { field: String, reason: String },

    /// The trigger loop is already running
    AlreadyRunning,

    /// A manual run was requested while the trigger loop is stopped
    NotRunning,

    /// The trigger loop stopped before answering a manual request
    TriggerDropped,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TriggerConfigError { field, reason } => {
                write!(f, "Trigger config error in '{}': {}", field, reason)
            }
            Self::AlreadyRunning => write!(f, "Scheduler is already running"),
            Self::NotRunning => write!(f, "Scheduler is not running"),
            Self::TriggerDropped => {
                write!(f, "Scheduler stopped before the manual run completed")
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

impl SchedulerError {
    /// Create a trigger config error
    pub fn trigger_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TriggerConfigError {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotRunning | Self::TriggerDropped)
    }
}
