//! Action errors

use thiserror::Error;

/// Action errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    #[error("Invalid action configuration: {0}")]
    InvalidConfig(String),

    #[error("Callback failed: {0}")]
    Callback(String),

    #[error("Action effect failed: {0}")]
    Effect(String),
}

/// Result type for action operations
pub type ActionResult<T> = Result<T, ActionError>;
