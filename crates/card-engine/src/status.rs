//! Card status
//!
//! Host session and initialization flags plus the message display, as seen
//! by the automation guard and the override error boundary.

use std::sync::atomic::{AtomicBool, Ordering};

use card_automation::AutomationsHost;
use card_core::{Message, MessageManager};

#[derive(Debug, Default)]
pub struct CardStatus {
    host_session: AtomicBool,
    initialized: AtomicBool,
    messages: MessageManager,
}

impl CardStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_host_session(&self, connected: bool) {
        self.host_session.store(connected, Ordering::SeqCst);
    }

    pub fn set_initialized(&self, initialized: bool) {
        self.initialized.store(initialized, Ordering::SeqCst);
    }

    pub fn messages(&self) -> &MessageManager {
        &self.messages
    }
}

impl AutomationsHost for CardStatus {
    fn has_host_session(&self) -> bool {
        self.host_session.load(Ordering::SeqCst)
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn has_error_message(&self) -> bool {
        self.messages.has_error()
    }

    fn set_error_message(&self, message: Message) {
        self.messages.set_message_if_higher_priority(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_block_automations() {
        let status = CardStatus::new();
        assert!(!status.has_host_session());
        assert!(!status.is_initialized());
        assert!(!status.has_error_message());
    }

    #[test]
    fn test_error_message_is_reported() {
        let status = CardStatus::new();
        status.set_host_session(true);
        status.set_initialized(true);

        status.set_error_message(Message::error("Too many nested automation calls"));
        assert!(status.has_error_message());

        status.messages().reset();
        assert!(!status.has_error_message());
    }
}
