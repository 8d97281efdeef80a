use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Planner inputs rejected before any vehicle command.
    InvalidGeometry,
    /// The planner produced no waypoints within the range budget.
    InfeasibleSurvey,
    /// Health, arm, altitude, arrival or landing predicate never held in time.
    PreconditionTimeout,
    /// Link loss, rejected command or reported vehicle fault.
    CollaboratorFault,
    /// External cancellation observed at a poll boundary.
    Cancelled,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::InvalidGeometry => "invalid_geometry",
            Self::InfeasibleSurvey => "infeasible_survey",
            Self::PreconditionTimeout => "precondition_timeout",
            Self::CollaboratorFault => "collaborator_fault",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionError {
    pub code: ErrorCode,
    pub message: String,
}

impl MissionError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_geometry(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidGeometry, message)
    }

    pub fn infeasible_survey(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InfeasibleSurvey, message)
    }

    pub fn precondition_timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PreconditionTimeout, message)
    }

    pub fn collaborator_fault(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::CollaboratorFault, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Cancelled, message)
    }
}

impl fmt::Display for MissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for MissionError {}

pub type MissionResult<T> = Result<T, MissionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_and_message() {
        let err = MissionError::precondition_timeout("health check not ok after 5s");
        assert_eq!(
            err.to_string(),
            "precondition_timeout: health check not ok after 5s"
        );
    }

    #[test]
    fn code_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorCode::InfeasibleSurvey).unwrap();
        assert_eq!(json, "\"infeasible_survey\"");
    }
}
