//! Condition Engine
//!
//! This crate provides the declarative condition language used by overrides,
//! automations and conditional UI elements, and the stateful manager that
//! evaluates it.
//!
//! # Architecture
//!
//! ```text
//! setState(partial) → ConditionsManager → ConditionEvaluator → listeners
//!                          ↑
//!                 viewport watchers (screen conditions)
//! ```
//!
//! # Key Types
//!
//! - [`Condition`] - A declarative test against runtime state
//! - [`ConditionEvaluator`] - Pure, total evaluation of conditions
//! - [`ConditionsManager`] - Owns state, scoped conditions and listeners
//! - [`Viewport`] - Source of `screen` media query results

pub mod condition;
pub mod discovery;
pub mod eval;
pub mod manager;
pub mod viewport;

pub use condition::{Condition, StateMatch};
pub use discovery::collect_conditions;
pub use eval::ConditionEvaluator;
pub use manager::{
    ConditionsEvaluation, ConditionsListener, ConditionsManager, ConditionsManagerEpoch,
    EvaluateConditions, ListenerId,
};
pub use viewport::{
    MediaQuery, SimulatedViewport, Viewport, ViewportCallback, ViewportError, ViewportWatch,
};
