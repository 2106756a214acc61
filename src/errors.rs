use std::fmt;

use thiserror::Error;

use crate::workflow::controller::WorkflowState;

/// Which part of the draft an input validation error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftField {
    Resume,
    JobDescription,
}

impl fmt::Display for DraftField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DraftField::Resume => write!(f, "resume"),
            DraftField::JobDescription => write!(f, "job description"),
        }
    }
}

/// Every failure the analysis workflow can surface to the presentation layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("the {field} is too short ({actual} characters, at least {min} required)")]
    ValidationInputTooShort {
        field: DraftField,
        min: usize,
        actual: usize,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("could not reach the analysis service: {0}")]
    Transport(String),

    #[error("analysis service unavailable after {attempts} attempt(s): {last_error}")]
    ServiceUnavailable { attempts: u32, last_error: String },

    #[error("the analysis service returned a response that is not valid JSON: {0}")]
    MalformedResponse(String),

    #[error("the analysis response has an invalid `{field}` field: {reason}")]
    SchemaViolation { field: String, reason: String },

    #[error("cannot {action} during the {state} step")]
    InvalidTransition {
        action: &'static str,
        state: WorkflowState,
    },
}

/// Fieldless discriminant of [`AnalysisError`], used to key user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ValidationInputTooShort,
    ConfigurationError,
    TransportFailure,
    ServiceUnavailable,
    MalformedResponse,
    SchemaViolation,
    InvalidTransition,
}

impl ErrorKind {
    pub fn headline(self) -> &'static str {
        match self {
            ErrorKind::ValidationInputTooShort => "Please add a bit more text",
            ErrorKind::ConfigurationError => "Missing or rejected API key",
            ErrorKind::TransportFailure => "Network problem",
            ErrorKind::ServiceUnavailable => "Could not finish analysis",
            ErrorKind::MalformedResponse | ErrorKind::SchemaViolation => {
                "The analysis came back in an unexpected shape"
            }
            ErrorKind::InvalidTransition => "That action is not available right now",
        }
    }

    /// Whether re-triggering the same analysis is a reasonable next step.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::TransportFailure
                | ErrorKind::ServiceUnavailable
                | ErrorKind::MalformedResponse
                | ErrorKind::SchemaViolation
        )
    }
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::ValidationInputTooShort { .. } => ErrorKind::ValidationInputTooShort,
            AnalysisError::Configuration(_) => ErrorKind::ConfigurationError,
            AnalysisError::Transport(_) => ErrorKind::TransportFailure,
            AnalysisError::ServiceUnavailable { .. } => ErrorKind::ServiceUnavailable,
            AnalysisError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            AnalysisError::SchemaViolation { .. } => ErrorKind::SchemaViolation,
            AnalysisError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
        }
    }

    pub(crate) fn schema(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AnalysisError::SchemaViolation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
