//! Action Runtime
//!
//! This crate compiles action configuration into executable actions and runs
//! them as cancellable, sequential batches.
//!
//! # Key Types
//!
//! - [`ActionSpec`] - Single, grouped or callback action configuration
//! - [`CardAction`] - The polymorphic `execute(api)` contract
//! - [`ActionSet`] - One running batch
//! - [`ActionRuntime`] - Runs batches and tracks the in-flight ones
//! - [`ActionEffects`] - Collaborator performing host and card side effects

pub mod action;
pub mod compile;
pub mod effects;
pub mod error;
pub mod runtime;
pub mod set;
pub mod spec;

pub use action::{
    CallbackAction, CardAction, EffectAction, HostAction, LogAction, LogLevel, SleepAction,
};
pub use compile::{compile_actions, is_card_action, CARD_ACTION};
pub use effects::{ActionApi, ActionEffects, LoggingEffects, NoopEffects};
pub use error::{ActionError, ActionResult};
pub use runtime::ActionRuntime;
pub use set::ActionSet;
pub use spec::{ActionContext, ActionSpec, DurationSpec, InternalCallback};
