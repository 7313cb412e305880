//! Automations
//!
//! Automations bind a condition list to actions that run when the list's
//! result changes. This crate provides:
//!
//! - [`AutomationConfig`] - Automation configuration
//! - [`AutomationsManager`] - Registration, edge triggering and the runaway guard
//! - [`AutomationsHost`] - Card status consulted before firing

pub mod config;
pub mod manager;

pub use config::{AutomationConfig, AutomationError, AutomationResult};
pub use manager::{AutomationsHost, AutomationsManager};
