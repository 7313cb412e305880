//! User-visible messages and the single-slot message display

use std::fmt;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Severity of a message; later variants take priority over earlier ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for MessageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageLevel::Info => write!(f, "info"),
            MessageLevel::Warning => write!(f, "warning"),
            MessageLevel::Error => write!(f, "error"),
        }
    }
}

/// A message shown in place of (or on top of) the card content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
    pub level: MessageLevel,

    /// Structured diagnostics (e.g. validation issues and the failing object)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl Message {
    pub fn new(level: MessageLevel, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level,
            context: None,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(MessageLevel::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(MessageLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(MessageLevel::Error, message)
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

/// Holds at most one displayed message
///
/// A new message only replaces the current one if it has a strictly higher
/// level, so an error is never hidden by a later warning.
#[derive(Debug, Default)]
pub struct MessageManager {
    current: RwLock<Option<Message>>,
}

impl MessageManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Display `message` unless an equal or higher priority message is shown.
    /// Returns whether the message was accepted.
    pub fn set_message_if_higher_priority(&self, message: Message) -> bool {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let accept = match current.as_ref() {
            Some(existing) => message.level > existing.level,
            None => true,
        };
        if accept {
            debug!(level = %message.level, message = %message.message, "Displaying message");
            *current = Some(message);
        }
        accept
    }

    /// The message currently displayed, if any
    pub fn current(&self) -> Option<Message> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether an error-level message is currently displayed
    pub fn has_error(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|m| m.level == MessageLevel::Error)
    }

    /// Clear the displayed message
    pub fn reset(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
