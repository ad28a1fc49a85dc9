//! Error types for the scheduler module

use std::fmt;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// A manual plan was requested while a scheduled plan is live
    Conflict {
        live_plan_id: String,
    },

    /// The requested plan is not among the upcoming plans
    PlanNotFound {
        plan_id: String,
    },

    /// Missing credentials or no groups configured
    Configuration {
        reason: String,
    },

    /// A refresh cycle could not run at all
    RefreshFailed {
        reason: String,
    },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict { live_plan_id } => {
                write!(
                    f,
                    "Cannot select a plan manually while plan '{}' is live",
                    live_plan_id
                )
            }
            Self::PlanNotFound { plan_id } => {
                write!(f, "Plan not found among upcoming plans: {}", plan_id)
            }
            Self::Configuration { reason } => {
                write!(f, "Scheduler configuration error: {}", reason)
            }
            Self::RefreshFailed { reason } => {
                write!(f, "Refresh failed: {}", reason)
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

impl SchedulerError {
    /// Create a conflict error
    pub fn conflict(live_plan_id: impl Into<String>) -> Self {
        Self::Conflict {
            live_plan_id: live_plan_id.into(),
        }
    }

    /// Create a plan not found error
    pub fn plan_not_found(plan_id: impl Into<String>) -> Self {
        Self::PlanNotFound {
            plan_id: plan_id.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a refresh failure
    pub fn refresh_failed(reason: impl Into<String>) -> Self {
        Self::RefreshFailed {
            reason: reason.into(),
        }
    }

    /// Check if the operation may succeed when retried later
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::RefreshFailed { .. })
    }

    /// Short machine-readable kind, for callers that map errors to responses
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Conflict { .. } => "conflict",
            Self::PlanNotFound { .. } => "not_found",
            Self::Configuration { .. } => "configuration",
            Self::RefreshFailed { .. } => "refresh_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SchedulerError::conflict("p1");
        assert!(err.to_string().contains("'p1' is live"));

        let err = SchedulerError::plan_not_found("p9");
        assert!(err.to_string().contains("p9"));
    }

    #[test]
    fn test_is_recoverable() {
        assert!(SchedulerError::conflict("p1").is_recoverable());
        assert!(SchedulerError::refresh_failed("busy").is_recoverable());
        assert!(!SchedulerError::plan_not_found("p1").is_recoverable());
        assert!(!SchedulerError::configuration("no groups").is_recoverable());
    }

    #[test]
    fn test_kind() {
        assert_eq!(SchedulerError::conflict("p").kind(), "conflict");
        assert_eq!(SchedulerError::plan_not_found("p").kind(), "not_found");
    }
}
