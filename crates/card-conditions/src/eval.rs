//! Condition evaluation logic
//!
//! Evaluation is a total function over the closed set of condition variants:
//! it never fails and never mutates state. A condition whose required state is
//! absent from the snapshot evaluates to `false`.

use std::sync::Arc;

use card_core::ConditionState;
use tracing::{debug, trace};

use crate::condition::{
    CameraCondition, Condition, KeyCondition, MicrophoneCondition, NumericStateCondition,
    StateCondition, TriggeredCondition, UsersCondition, ViewCondition,
};
use crate::viewport::Viewport;

/// Condition evaluator
///
/// Evaluates conditions against a [`ConditionState`] snapshot. `screen`
/// conditions are delegated to the viewport.
#[derive(Clone)]
pub struct ConditionEvaluator {
    viewport: Arc<dyn Viewport>,
}

impl std::fmt::Debug for ConditionEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionEvaluator").finish_non_exhaustive()
    }
}

impl ConditionEvaluator {
    /// Create a new condition evaluator
    pub fn new(viewport: Arc<dyn Viewport>) -> Self {
        Self { viewport }
    }

    /// The viewport used for `screen` conditions
    pub fn viewport(&self) -> &Arc<dyn Viewport> {
        &self.viewport
    }

    /// Evaluate a condition
    ///
    /// Returns `true` if the condition is satisfied, `false` otherwise.
    pub fn evaluate(&self, condition: &Condition, state: &ConditionState) -> bool {
        let result = match condition {
            Condition::State(c) => self.eval_state(c, state),
            Condition::NumericState(c) => self.eval_numeric_state(c, state),
            Condition::View(c) => self.eval_view(c, state),
            Condition::Fullscreen(c) => state.fullscreen == Some(c.fullscreen),
            Condition::Expand(c) => state.expand == Some(c.expand),
            Condition::Camera(c) => self.eval_camera(c, state),
            Condition::MediaLoaded(c) => state.media_loaded == Some(c.media_loaded),
            Condition::Screen(c) => self.viewport.matches(&c.media_query),
            Condition::DisplayMode(c) => state.display_mode == Some(c.display_mode),
            Condition::Triggered(c) => self.eval_triggered(c, state),
            Condition::Interaction(c) => state.interaction == Some(c.interaction),
            Condition::Microphone(c) => self.eval_microphone(c, state),
            Condition::Key(c) => self.eval_key(c, state),
            Condition::Users(c) => self.eval_users(c, state),
            Condition::And(c) => self.evaluate_all(&c.conditions, state),
            Condition::Or(c) => self.evaluate_any(&c.conditions, state),
            Condition::Not(c) => !self.evaluate_any(&c.conditions, state),
        };
        trace!(kind = condition.kind(), result, "Evaluated condition");
        result
    }

    /// Evaluate multiple conditions (all must pass)
    pub fn evaluate_all(&self, conditions: &[Condition], state: &ConditionState) -> bool {
        conditions.iter().all(|c| self.evaluate(c, state))
    }

    /// Evaluate multiple conditions (any must pass)
    pub fn evaluate_any(&self, conditions: &[Condition], state: &ConditionState) -> bool {
        conditions.iter().any(|c| self.evaluate(c, state))
    }

    fn eval_state(&self, condition: &StateCondition, state: &ConditionState) -> bool {
        let Some(entity) = state
            .entities
            .as_ref()
            .and_then(|entities| entities.get(&condition.entity))
        else {
            debug!(entity = %condition.entity, "Entity not in telemetry");
            return false;
        };

        let included = condition
            .state
            .as_ref()
            .map_or(true, |m| m.matches(&entity.state));
        let excluded = condition
            .state_not
            .as_ref()
            .is_some_and(|m| m.matches(&entity.state));

        included && !excluded
    }

    fn eval_numeric_state(&self, condition: &NumericStateCondition, state: &ConditionState) -> bool {
        let Some(entity) = state
            .entities
            .as_ref()
            .and_then(|entities| entities.get(&condition.entity))
        else {
            debug!(entity = %condition.entity, "Entity not in telemetry");
            return false;
        };

        let value: f64 = match entity.state.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                debug!(
                    entity = %condition.entity,
                    state = %entity.state,
                    "State is not numeric"
                );
                return false;
            }
        };
        if value.is_nan() {
            return false;
        }

        if let Some(above) = condition.above {
            if value <= above {
                return false;
            }
        }
        if let Some(below) = condition.below {
            if value >= below {
                return false;
            }
        }
        true
    }

    fn eval_view(&self, condition: &ViewCondition, state: &ConditionState) -> bool {
        state
            .view
            .as_ref()
            .is_some_and(|view| condition.views.iter().any(|v| v == view))
    }

    fn eval_camera(&self, condition: &CameraCondition, state: &ConditionState) -> bool {
        state
            .camera
            .as_ref()
            .is_some_and(|camera| condition.cameras.iter().any(|c| c == camera))
    }

    fn eval_triggered(&self, condition: &TriggeredCondition, state: &ConditionState) -> bool {
        state.triggered.as_ref().is_some_and(|triggered| {
            condition
                .triggered
                .iter()
                .any(|camera| triggered.contains(camera))
        })
    }

    fn eval_microphone(&self, condition: &MicrophoneCondition, state: &ConditionState) -> bool {
        let Some(microphone) = state.microphone else {
            return false;
        };
        condition.connected.map_or(true, |c| c == microphone.connected)
            && condition.muted.map_or(true, |m| m == microphone.muted)
    }

    fn eval_key(&self, condition: &KeyCondition, state: &ConditionState) -> bool {
        let Some(key) = state
            .keys
            .as_ref()
            .and_then(|keys| keys.get(&condition.key))
        else {
            return false;
        };

        let modifier = |expected: Option<bool>, actual: bool| expected.map_or(true, |e| e == actual);

        key.state == condition.state
            && modifier(condition.ctrl, key.ctrl)
            && modifier(condition.alt, key.alt)
            && modifier(condition.meta, key.meta)
            && modifier(condition.shift, key.shift)
    }

    fn eval_users(&self, condition: &UsersCondition, state: &ConditionState) -> bool {
        state
            .user
            .as_ref()
            .is_some_and(|user| condition.users.iter().any(|u| *u == user.id))
    }
}
