//! Card controller
//!
//! Wires one card session together: the session [`ConditionsManager`], the
//! override compiler producing the effective configuration, the
//! [`AutomationsManager`] and the [`ActionRuntime`].
//!
//! Listener order on the session manager is fixed at construction: the
//! effective configuration is recomputed before automations re-evaluate.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use card_actions::{ActionEffects, ActionRuntime, ActionSpec};
use card_automation::{AutomationConfig, AutomationsManager};
use card_conditions::{
    Condition, ConditionsEvaluation, ConditionsManager, ConditionsManagerEpoch,
    EvaluateConditions, ListenerId, Viewport,
};
use card_core::{ConditionState, EntityState, Message, StateKey};
use card_overrides::{ConfigSchema, OverrideCompiler, OverrideError};
use serde_json::{json, Value};
use tracing::{debug, error, info, trace};
use ulid::Ulid;

use crate::config::{view_actions, CardConfig};
use crate::error::EngineResult;
use crate::status::CardStatus;

/// Collaborators of a card session
pub struct ControllerOptions {
    pub viewport: Arc<dyn Viewport>,
    pub effects: Arc<dyn ActionEffects>,
    pub schema: Option<ConfigSchema>,
}

impl ControllerOptions {
    pub fn new(viewport: Arc<dyn Viewport>, effects: Arc<dyn ActionEffects>) -> Self {
        Self {
            viewport,
            effects,
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: ConfigSchema) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// A synchronous evaluation request from a UI element the engine does not own
///
/// The result is written back before the handling call returns.
#[derive(Debug, Clone, Default)]
pub struct ConditionsEvaluationRequest {
    pub conditions: Vec<Condition>,
    pub state_overrides: Option<ConditionState>,
    pub result: Option<bool>,
}

impl ConditionsEvaluationRequest {
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self {
            conditions,
            ..Default::default()
        }
    }

    pub fn with_state_overrides(mut self, overrides: ConditionState) -> Self {
        self.state_overrides = Some(overrides);
        self
    }
}

/// Which configuration and session epoch the effective config was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CompiledFrom {
    generation: u64,
    epoch: ConditionsManagerEpoch,
}

/// One card session
pub struct CardController {
    conditions: Arc<ConditionsManager>,
    actions: Arc<ActionRuntime>,
    automations: Arc<AutomationsManager>,
    status: Arc<CardStatus>,
    schema: Option<ConfigSchema>,
    config: RwLock<Option<Arc<CardConfig>>>,
    generation: AtomicU64,
    effective: RwLock<Option<Arc<Value>>>,
    compiled_from: Mutex<Option<CompiledFrom>>,
    recompute_listener: ListenerId,
}

impl fmt::Debug for CardController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardController")
            .field("conditions", &self.conditions)
            .field("automations", &self.automations)
            .field("actions", &self.actions)
            .finish_non_exhaustive()
    }
}

impl CardController {
    pub fn new(options: ControllerOptions) -> Arc<Self> {
        let conditions = ConditionsManager::new(options.viewport);
        let actions = Arc::new(ActionRuntime::new(options.effects));
        let status = Arc::new(CardStatus::new());

        Arc::new_cyclic(|weak_self: &Weak<CardController>| {
            let weak = weak_self.clone();
            let recompute_listener =
                conditions.add_listener(Arc::new(move |_: &ConditionsEvaluation| {
                    if let Some(controller) = weak.upgrade() {
                        controller.recompute();
                    }
                }));
            let automations = AutomationsManager::new(
                Arc::clone(&conditions),
                Arc::clone(&actions),
                status.clone(),
            );

            Self {
                conditions,
                actions,
                automations,
                status,
                schema: options.schema,
                config: RwLock::new(None),
                generation: AtomicU64::new(0),
                effective: RwLock::new(None),
                compiled_from: Mutex::new(None),
                recompute_listener,
            }
        })
    }

    /// Load a new card configuration
    ///
    /// Replaces the scoped conditions with every condition referenced in the
    /// configuration, re-registers the configured automations and recomputes
    /// the effective configuration.
    pub fn set_config(&self, value: Value) -> EngineResult<()> {
        let config = Arc::new(CardConfig::from_value(value)?);
        info!(
            card_id = ?config.card_id,
            overrides = config.overrides.len(),
            automations = config.automations.len(),
            "Loading card configuration"
        );

        self.actions.set_card_id(config.card_id.clone());
        self.status.messages().reset();
        self.automations.delete_all();

        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&config));
        self.generation.fetch_add(1, Ordering::SeqCst);

        self.conditions.set_conditions_from_config(&config.raw);
        self.recompute();
        self.automations.add_automations(config.automations.clone());
        Ok(())
    }

    /// The loaded configuration, if any
    pub fn config(&self) -> Option<Arc<CardConfig>> {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The base configuration with every matching override applied
    ///
    /// When no override applies this is the very same allocation as the
    /// loaded configuration.
    pub fn effective_config(&self) -> Option<Arc<Value>> {
        self.effective
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Actions of `view` in the effective configuration
    pub fn view_actions(&self, view: &str) -> Option<Value> {
        self.effective_config()
            .map(|config| view_actions(&config, view))
    }

    pub fn get_state(&self) -> ConditionState {
        self.conditions.get_state()
    }

    pub fn get_epoch(&self) -> ConditionsManagerEpoch {
        self.conditions.get_epoch()
    }

    pub fn set_state(&self, patch: ConditionState) {
        self.conditions.set_state(patch);
    }

    /// Remove state values, e.g. the user on logout
    pub fn clear_state(&self, keys: &[StateKey]) {
        self.conditions.clear_state(keys);
    }

    /// Whether any configured condition reads entity telemetry
    pub fn needs_telemetry(&self) -> bool {
        self.conditions.has_telemetry_conditions()
    }

    /// Push entity telemetry, skipped when nothing depends on it. Returns
    /// whether the telemetry was applied.
    pub fn update_telemetry(&self, entities: HashMap<String, EntityState>) -> bool {
        if !self.needs_telemetry() {
            trace!(entities = entities.len(), "Telemetry not needed, skipping");
            return false;
        }
        self.conditions.set_state(ConditionState {
            entities: Some(entities),
            ..Default::default()
        });
        true
    }

    /// Run an action batch for this card
    pub async fn execute_actions(
        &self,
        spec: &ActionSpec,
        aux_config: Option<Value>,
    ) -> EngineResult<()> {
        self.actions.execute_actions(spec, aux_config).await?;
        Ok(())
    }

    /// Evaluation capability for UI elements the engine does not own
    pub fn evaluator(&self) -> Arc<dyn EvaluateConditions> {
        self.conditions.clone()
    }

    /// Answer a synchronous evaluation request in place
    pub fn handle_evaluation_request(&self, request: &mut ConditionsEvaluationRequest) {
        let result = self
            .conditions
            .evaluate_conditions(&request.conditions, request.state_overrides.as_ref());
        trace!(conditions = request.conditions.len(), result, "Answered evaluation request");
        request.result = Some(result);
    }

    /// Register automations owned by another part of the card
    pub fn add_automations(&self, automations: Vec<AutomationConfig>) -> Vec<Ulid> {
        self.automations.add_automations(automations)
    }

    pub fn delete_automations(&self, tag: &str) -> usize {
        self.automations.delete_automations(tag)
    }

    pub fn status(&self) -> &CardStatus {
        &self.status
    }

    pub fn conditions(&self) -> &Arc<ConditionsManager> {
        &self.conditions
    }

    /// Number of action batches currently running
    pub fn in_flight_actions(&self) -> usize {
        self.actions.in_flight_count()
    }

    /// Stop in-flight actions and detach from everything
    pub fn teardown(&self) {
        info!("Tearing down card controller");
        self.actions.stop_all();
        self.automations.destroy();
        self.conditions.remove_listener(self.recompute_listener);
        self.conditions.destroy();
    }

    fn recompute(&self) {
        let Some(config) = self.config() else {
            return;
        };

        let current = CompiledFrom {
            generation: self.generation.load(Ordering::SeqCst),
            epoch: self.conditions.get_epoch(),
        };
        {
            let mut compiled_from = self
                .compiled_from
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *compiled_from == Some(current) {
                trace!("Effective configuration up to date");
                return;
            }
            *compiled_from = Some(current);
        }

        let mut compiler = OverrideCompiler::new(self.conditions.as_ref());
        if let Some(schema) = &self.schema {
            compiler = compiler.with_schema(schema);
        }

        match compiler.compile(&config.raw, &config.overrides) {
            Ok(effective) => {
                debug!(
                    overridden = !Arc::ptr_eq(&effective, &config.raw),
                    version = current.epoch.version,
                    "Effective configuration computed"
                );
                *self.effective.write().unwrap_or_else(PoisonError::into_inner) = Some(effective);
            }
            Err(e) => {
                error!(error = %e, "Configuration override failed");
                let context = match &e {
                    OverrideError::Invalid(invalid) => invalid.context(),
                    _ => json!({}),
                };
                self.status
                    .messages()
                    .set_message_if_higher_priority(Message::error(e.to_string()).with_context(context));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use card_actions::NoopEffects;
    use card_conditions::SimulatedViewport;
    use serde_json::json;

    fn controller() -> Arc<CardController> {
        CardController::new(ControllerOptions::new(
            Arc::new(SimulatedViewport::default()),
            Arc::new(NoopEffects),
        ))
    }

    #[test]
    fn test_effective_config_is_base_without_matches() {
        let controller = controller();
        controller
            .set_config(json!({
                "menu": {"style": "hidden"},
                "overrides": [{
                    "conditions": [{"condition": "fullscreen", "fullscreen": true}],
                    "set": {"menu.style": "none"}
                }]
            }))
            .unwrap();

        let config = controller.config().unwrap();
        let effective = controller.effective_config().unwrap();
        assert!(Arc::ptr_eq(&effective, &config.raw));

        controller.set_state(ConditionState::new().with_fullscreen(true));
        let effective = controller.effective_config().unwrap();
        assert_eq!(effective["menu"]["style"], "none");

        controller.set_state(ConditionState::new().with_fullscreen(false));
        let effective = controller.effective_config().unwrap();
        assert!(Arc::ptr_eq(&effective, &config.raw));
    }

    #[test]
    fn test_update_telemetry_skipped_without_state_conditions() {
        let controller = controller();
        controller
            .set_config(json!({
                "overrides": [{
                    "conditions": [{"condition": "view", "views": ["live"]}],
                    "set": {"live.preload": true}
                }]
            }))
            .unwrap();
        assert!(!controller.needs_telemetry());

        let epoch = controller.get_epoch();
        let entities = HashMap::from([("sensor.door".to_string(), EntityState::new("open"))]);
        assert!(!controller.update_telemetry(entities));
        assert_eq!(controller.get_epoch(), epoch);
    }

    #[test]
    fn test_update_telemetry_applied_with_state_conditions() {
        let controller = controller();
        controller
            .set_config(json!({
                "elements": [{
                    "type": "custom:advanced-camera-card-conditional",
                    "conditions": [{"condition": "state", "entity": "binary_sensor.door", "state": "on"}],
                    "elements": []
                }]
            }))
            .unwrap();
        assert!(controller.needs_telemetry());

        let entities = HashMap::from([("binary_sensor.door".to_string(), EntityState::new("on"))]);
        assert!(controller.update_telemetry(entities));

        let mut request = ConditionsEvaluationRequest::new(vec![Condition::state(
            "binary_sensor.door",
            "on",
        )]);
        controller.handle_evaluation_request(&mut request);
        assert_eq!(request.result, Some(true));
    }

    #[test]
    fn test_evaluation_request_with_overrides() {
        let controller = controller();
        controller.set_state(ConditionState::new().with_view("live"));

        let mut request = ConditionsEvaluationRequest::new(vec![Condition::view(["clips"])])
            .with_state_overrides(ConditionState::new().with_view("clips"));
        controller.handle_evaluation_request(&mut request);
        assert_eq!(request.result, Some(true));
        assert_eq!(controller.get_state().view.as_deref(), Some("live"));
    }

    #[test]
    fn test_override_error_routed_to_messages() {
        let schema = ConfigSchema::compile(&json!({
            "type": "object",
            "properties": {"menu": {"type": "object"}}
        }))
        .unwrap();
        let controller = CardController::new(
            ControllerOptions::new(Arc::new(SimulatedViewport::default()), Arc::new(NoopEffects))
                .with_schema(schema),
        );

        controller
            .set_config(json!({
                "menu": {"style": "hidden"},
                "overrides": [{
                    "conditions": [{"condition": "expand", "expand": true}],
                    "set": {"menu": "broken"}
                }]
            }))
            .unwrap();
        assert!(controller.status().messages().current().is_none());
        let before = controller.effective_config().unwrap();

        controller.set_state(ConditionState {
            expand: Some(true),
            ..Default::default()
        });

        let message = controller.status().messages().current().unwrap();
        assert!(controller.status().messages().has_error());
        assert_eq!(message.context.unwrap()["config"]["menu"], "broken");
        assert!(Arc::ptr_eq(&controller.effective_config().unwrap(), &before));
    }

    #[test]
    fn test_teardown_detaches_listeners() {
        let controller = controller();
        controller
            .set_config(json!({
                "automations": [{
                    "conditions": [{"condition": "screen", "media_query": "(orientation: portrait)"}],
                    "actions": {"action": "fire-dom-event", "card_action": "menu_toggle"}
                }]
            }))
            .unwrap();
        assert_eq!(controller.conditions().listener_count(), 2);

        controller.teardown();
        assert_eq!(controller.conditions().listener_count(), 0);
        assert_eq!(controller.conditions().watch_count(), 0);
    }
}
