//! Override errors

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Errors parsing a configuration path
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigPathError {
    #[error("Empty configuration path")]
    Empty,

    #[error("Empty key at offset {offset} in '{path}'")]
    EmptyKey { path: String, offset: usize },

    #[error("Unterminated bracket in '{path}'")]
    UnterminatedBracket { path: String },

    #[error("Invalid index '{index}' in '{path}'")]
    InvalidIndex { path: String, index: String },

    #[error("Unexpected character '{found}' at offset {offset} in '{path}'")]
    UnexpectedChar {
        path: String,
        offset: usize,
        found: char,
    },
}

/// One schema violation found in an overridden configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// JSON pointer to the offending value (`/live/controls/0`)
    pub path: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// An override produced a configuration that fails schema validation
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigOverrideError {
    pub issues: Vec<ValidationIssue>,

    /// The overridden configuration that failed validation
    pub config: Value,
}

impl ConfigOverrideError {
    /// Structured diagnostics suitable for a message context
    pub fn context(&self) -> Value {
        serde_json::json!({
            "issues": self.issues,
            "config": self.config,
        })
    }
}

impl fmt::Display for ConfigOverrideError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid override configuration")?;
        if let Some(first) = self.issues.first() {
            write!(f, ": {first}")?;
            if self.issues.len() > 1 {
                write!(f, " (and {} more)", self.issues.len() - 1)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ConfigOverrideError {}

/// Override errors
#[derive(Debug, Error)]
pub enum OverrideError {
    #[error(transparent)]
    Invalid(#[from] ConfigOverrideError),

    #[error("Invalid configuration schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid override rule: {0}")]
    InvalidRule(#[from] serde_json::Error),
}

/// Result type for override operations
pub type OverrideResult<T> = Result<T, OverrideError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_override_error_display() {
        let err = ConfigOverrideError {
            issues: vec![
                ValidationIssue {
                    path: "/menu/style".into(),
                    message: "\"sideways\" is not one of [\"none\",\"overlay\"]".into(),
                },
                ValidationIssue {
                    path: "".into(),
                    message: "other".into(),
                },
            ],
            config: json!({"menu": {"style": "sideways"}}),
        };

        let text = err.to_string();
        assert!(text.starts_with("Invalid override configuration: /menu/style:"));
        assert!(text.ends_with("(and 1 more)"));
        assert_eq!(err.context()["issues"][0]["path"], "/menu/style");
    }
}
