//! Engine errors

use card_actions::ActionError;
use card_automation::AutomationError;
use card_config::ConfigError;
use card_overrides::OverrideError;
use thiserror::Error;

/// Errors surfaced by the card controller
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Override error: {0}")]
    Override(#[from] OverrideError),

    #[error("Automation error: {0}")]
    Automation(#[from] AutomationError),

    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    #[error("Invalid card configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid replay step on line {line}: {source}")]
    ReplayStep {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
