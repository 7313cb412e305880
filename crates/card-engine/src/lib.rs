//! Card Engine
//!
//! Reactive engine behind the camera card: the session condition state, the
//! effective configuration computed from override rules, automations and
//! action batches, wired together in a [`CardController`].

pub mod config;
pub mod controller;
pub mod error;
pub mod replay;
pub mod status;

pub use config::{view_actions, CardConfig};
pub use controller::{CardController, ConditionsEvaluationRequest, ControllerOptions};
pub use error::{EngineError, EngineResult};
pub use replay::{parse_steps, ReplaySession, ReplayStep};
pub use status::CardStatus;
