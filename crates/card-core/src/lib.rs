//! Core types for the camera card engine
//!
//! This crate provides the fundamental types shared by every other crate in
//! the workspace: the [`ConditionState`] snapshot that conditions are
//! evaluated against, and the [`Message`] model used to surface errors to the
//! card's message display.

mod message;
mod state;

pub use message::{Message, MessageLevel, MessageManager};
pub use state::{
    ConditionState, DisplayMode, EntityState, KeyPress, KeyState, MicrophoneState, StateKey, User,
};

/// Maximum nesting of automation-triggered action batches before the
/// runaway guard aborts execution
pub const MAX_NESTED_AUTOMATION_EXECUTIONS: usize = 10;
