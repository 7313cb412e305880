//! Card configuration as seen by the engine

use std::sync::Arc;

use card_automation::AutomationConfig;
use card_overrides::{tree, OverrideRule};
use serde_json::{Map, Value};

use crate::error::{EngineError, EngineResult};

/// A card configuration with its engine sections parsed
#[derive(Debug, Clone)]
pub struct CardConfig {
    /// Identifier used to skip actions addressed to other cards
    pub card_id: Option<String>,

    /// Ordered override rules
    pub overrides: Vec<OverrideRule>,

    /// Automations registered for the card
    pub automations: Vec<AutomationConfig>,

    /// The full configuration tree; the base for override compilation
    pub raw: Arc<Value>,
}

impl CardConfig {
    pub fn from_value(value: Value) -> EngineResult<Self> {
        if !value.is_object() {
            return Err(EngineError::InvalidConfig(
                "card configuration must be an object".to_string(),
            ));
        }

        let card_id = match value.get("card_id") {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) => Some(id.clone()),
            Some(other) => {
                return Err(EngineError::InvalidConfig(format!(
                    "card_id must be a string, got {other}"
                )))
            }
        };
        let overrides = OverrideRule::parse_list(value.get("overrides").unwrap_or(&Value::Null))?;
        let automations =
            AutomationConfig::parse_list(value.get("automations").unwrap_or(&Value::Null))?;

        Ok(Self {
            card_id,
            overrides,
            automations,
            raw: Arc::new(value),
        })
    }
}

/// Actions for `view`: the view-specific `<view>.actions` deep-merged over the
/// shared `view.actions`
pub fn view_actions(config: &Value, view: &str) -> Value {
    let mut actions = config
        .pointer("/view/actions")
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));

    if let Some(specific) = config.get(view).and_then(|section| section.get("actions")) {
        tree::deep_merge(&mut actions, specific.clone());
    }
    actions
}
