//! Error types for ergodoc.

use crate::snapshot::SnapshotKind;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DoctorError {
    #[error("Malformed {kind} observation: field '{field}' {reason}")]
    MalformedObservation {
        kind: SnapshotKind,
        field: String,
        reason: String,
    },

    #[error("Cannot compare a {left} snapshot with a {right} snapshot")]
    IncompatibleSnapshotKind {
        left: SnapshotKind,
        right: SnapshotKind,
    },

    #[error("Observation '{request}' timed out after {timeout_ms}ms")]
    ObservationTimeout { request: String, timeout_ms: u64 },

    #[error("An observation is already pending for this session")]
    ObservationAlreadyPending,

    #[error("Action '{action}' requires explicit authorization")]
    AuthorizationRequired { action: String },

    #[error("Session budget exhausted after {steps_used} step(s) and {elapsed_ms}ms")]
    BudgetExhausted { steps_used: u32, elapsed_ms: u64 },

    #[error("A session must start with a broad survey, got '{request}'")]
    SurveyRequired { request: String },

    #[error("Session already concluded")]
    SessionConcluded,

    #[error("Observation ticket is not the pending one for this session")]
    StaleTicket,

    #[error("Unknown playbook: {0}")]
    UnknownPlaybook(String),

    #[error("Invalid playbook: {0}")]
    InvalidPlaybook(String),

    #[error("Observation failed: {0}")]
    ObservationFailed(String),

    #[error("Action failed: {0}")]
    ActionFailed(String),
}

impl DoctorError {
    pub fn code(&self) -> i32 {
        match self {
            DoctorError::MalformedObservation { .. } => -32010,
            DoctorError::IncompatibleSnapshotKind { .. } => -32011,
            DoctorError::ObservationTimeout { .. } => -32012,
            DoctorError::ObservationAlreadyPending => -32013,
            DoctorError::AuthorizationRequired { .. } => -32014,
            DoctorError::BudgetExhausted { .. } => -32015,
            DoctorError::SurveyRequired { .. } => -32016,
            DoctorError::SessionConcluded => -32017,
            DoctorError::UnknownPlaybook(_) => -32018,
            DoctorError::InvalidPlaybook(_) => -32019,
            DoctorError::ObservationFailed(_) => -32020,
            DoctorError::ActionFailed(_) => -32021,
            DoctorError::StaleTicket => -32022,
        }
    }

    /// Observation-level failures: the attempt is lost, the session is not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DoctorError::MalformedObservation { .. }
                | DoctorError::ObservationTimeout { .. }
                | DoctorError::ObservationFailed(_)
        )
    }

    pub(crate) fn malformed(kind: SnapshotKind, field: &str, reason: impl Into<String>) -> Self {
        DoctorError::MalformedObservation {
            kind,
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DoctorError>;
