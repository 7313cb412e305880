//! Automation configuration
//!
//! An automation binds a condition list to two action lists: `actions` run
//! when the conditions become true, `actions_not` when they become false.

use card_actions::ActionSpec;
use card_conditions::Condition;
use card_core::MAX_NESTED_AUTOMATION_EXECUTIONS;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Automation errors
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("Invalid automation configuration: {0}")]
    InvalidConfig(#[from] serde_json::Error),

    #[error(
        "Too many nested automation calls, please check your configuration for loops (limit {limit})"
    )]
    Runaway { limit: usize },
}

impl AutomationError {
    pub(crate) fn runaway() -> Self {
        AutomationError::Runaway {
            limit: MAX_NESTED_AUTOMATION_EXECUTIONS,
        }
    }
}

/// Result type for automation operations
pub type AutomationResult<T> = Result<T, AutomationError>;

/// Automation configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AutomationConfig {
    /// Conditions, ANDed together
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Run when the conditions become true
    #[serde(default)]
    pub actions: ActionSpec,

    /// Run when the conditions become false
    #[serde(default)]
    pub actions_not: ActionSpec,

    /// Grouping key for bulk removal
    #[serde(default)]
    pub tag: Option<String>,
}

impl AutomationConfig {
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self {
            conditions,
            ..Default::default()
        }
    }

    pub fn with_actions(mut self, actions: impl Into<ActionSpec>) -> Self {
        self.actions = actions.into();
        self
    }

    pub fn with_actions_not(mut self, actions: impl Into<ActionSpec>) -> Self {
        self.actions_not = actions.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Actions for a given evaluation result
    pub fn actions_for(&self, result: bool) -> &ActionSpec {
        if result {
            &self.actions
        } else {
            &self.actions_not
        }
    }

    /// Parse an `automations` list; a missing list yields no automations
    pub fn parse_list(value: &Value) -> AutomationResult<Vec<AutomationConfig>> {
        if value.is_null() {
            return Ok(Vec::new());
        }
        Ok(Vec::<AutomationConfig>::deserialize(value)?)
    }
}
