use crate::config::SettingsError;
use crate::sync::types::CoordinatorState;
use thiserror::Error;

/// Errors returned by the coordinator's control surface
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Cannot {operation} while coordinator is {from}")]
    InvalidTransition {
        from: CoordinatorState,
        operation: &'static str,
    },

    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("Interval must be at least one minute, got {0}")]
    InvalidInterval(u32),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Background task failed to join: {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        SyncError::Join(err.to_string())
    }
}
