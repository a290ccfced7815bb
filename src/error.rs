use thiserror::Error;

use crate::domain::{MergeKey, ProcessId};

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors surfaced by the orchestration core
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Process not configured: {0}")]
    ProcessNotFound(ProcessId),

    #[error("Merge not found: {0}")]
    MergeNotFound(MergeKey),

    #[error("Merge not ready: {key} has {validated}/{required} validated fragments")]
    MergeNotReady {
        key: MergeKey,
        validated: usize,
        required: usize,
    },

    #[error("Invalid process configuration for {process_id}: {reason}")]
    InvalidProcessConfig { process_id: ProcessId, reason: String },

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Invalid scenario time: {0}")]
    InvalidScenarioTime(String),

    #[error("Merge task for {key} aborted: {reason}")]
    MergeTaskAborted { key: MergeKey, reason: String },
}

impl OrchestratorError {
    pub fn storage(message: impl Into<String>) -> Self {
        OrchestratorError::Storage(message.into())
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, OrchestratorError::Storage(_))
    }
}

#[cfg(feature = "db")]
impl From<sqlx::Error> for OrchestratorError {
    fn from(error: sqlx::Error) -> Self {
        OrchestratorError::Storage(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_error_display() {
        let key = MergeKey::new(
            ProcessId::from("SWE"),
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap(),
        );
        let err = OrchestratorError::MergeNotReady {
            key,
            validated: 2,
            required: 3,
        };
        assert_eq!(
            err.to_string(),
            "Merge not ready: SWE@2024-03-01T10:30:00Z has 2/3 validated fragments"
        );
        assert!(OrchestratorError::storage("disk full").is_storage());
    }
}
