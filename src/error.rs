//! Error handling module
//!
//! Provides the unified error type for the governance core.
//! Only configuration-level problems surface as errors; check failures,
//! timeouts and scoring degeneracies are recovered into result objects.

use crate::lifecycle::LifecycleStage;
use serde::Serialize;
use thiserror::Error;

/// Governance-wide error type
#[derive(Error, Debug)]
pub enum GovernanceError {
    #[error("Duplicate check id: {0}")]
    DuplicateCheck(String),

    #[error("Check '{check}' depends on unknown check '{dependency}'")]
    UnknownDependency { check: String, dependency: String },

    #[error("Check '{check}' ({stage}) depends on '{dependency}' from stage {dependency_stage}")]
    CrossStageDependency {
        check: String,
        stage: LifecycleStage,
        dependency: String,
        dependency_stage: LifecycleStage,
    },

    #[error("Dependency cycle detected in stage {stage} among: {}", checks.join(", "))]
    CycleDetected {
        stage: LifecycleStage,
        checks: Vec<String>,
    },

    #[error("Unknown framework: {0}")]
    UnknownFramework(String),

    #[error("Invalid policy rule '{rule_id}': {message}")]
    InvalidRule { rule_id: String, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GovernanceError {
    /// Stable machine-readable code, used by outer layers when rendering errors
    pub fn code(&self) -> &'static str {
        match self {
            GovernanceError::DuplicateCheck(_) => "DUPLICATE_CHECK",
            GovernanceError::UnknownDependency { .. } => "UNKNOWN_DEPENDENCY",
            GovernanceError::CrossStageDependency { .. } => "CROSS_STAGE_DEPENDENCY",
            GovernanceError::CycleDetected { .. } => "CYCLE_DETECTED",
            GovernanceError::UnknownFramework(_) => "UNKNOWN_FRAMEWORK",
            GovernanceError::InvalidRule { .. } => "INVALID_RULE",
            GovernanceError::Validation(_) => "VALIDATION_ERROR",
            GovernanceError::Persistence(_) => "PERSISTENCE_ERROR",
            GovernanceError::Serialization(_) => "SERIALIZATION_ERROR",
            GovernanceError::Io(_) => "IO_ERROR",
        }
    }

    /// Configuration errors abort a run before anything executes
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            GovernanceError::UnknownDependency { .. }
                | GovernanceError::CrossStageDependency { .. }
                | GovernanceError::CycleDetected { .. }
                | GovernanceError::UnknownFramework(_)
        )
    }
}

impl From<validator::ValidationErrors> for GovernanceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        GovernanceError::Validation(errors.to_string())
    }
}

/// Error body handed to outer layers (API, batch runner)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub success: bool,
    pub message: String,
    pub code: String,
}

impl From<&GovernanceError> for ErrorReport {
    fn from(err: &GovernanceError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            code: err.code().to_string(),
        }
    }
}

/// Result type alias for governance operations
pub type GovResult<T> = Result<T, GovernanceError>;

/// Helper function to create a validation error
pub fn validation_error(msg: impl Into<String>) -> GovernanceError {
    GovernanceError::Validation(msg.into())
}

/// Helper function to create a persistence error
pub fn persistence_error(msg: impl Into<String>) -> GovernanceError {
    GovernanceError::Persistence(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors_are_flagged() {
        let err = GovernanceError::UnknownDependency {
            check: "b".to_string(),
            dependency: "missing".to_string(),
        };
        assert!(err.is_configuration());
        assert_eq!(err.code(), "UNKNOWN_DEPENDENCY");

        let err = validation_error("bad id");
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_cycle_message_lists_checks() {
        let err = GovernanceError::CycleDetected {
            stage: LifecycleStage::Training,
            checks: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Dependency cycle detected in stage training among: a, b"
        );
    }

    #[test]
    fn test_error_report_from_error() {
        let err = GovernanceError::UnknownFramework("sox".to_string());
        let report = ErrorReport::from(&err);
        assert!(!report.success);
        assert_eq!(report.code, "UNKNOWN_FRAMEWORK");
        assert_eq!(report.message, "Unknown framework: sox");
    }
}
