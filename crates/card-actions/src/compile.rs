//! Action compilation
//!
//! Turns an [`ActionSpec`] into a flat, ordered list of [`CardAction`]s.
//! Nested groups run sequentially, so flattening them preserves order.
//!
//! Internal card actions use `action: fire-dom-event` with the kind under
//! `card_action` and are dispatched through a registry keyed on that kind.
//! Host actions are dispatched on `action` itself.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde_json::Value;
use tracing::{trace, warn};

use crate::action::{CallbackAction, CardAction, EffectAction, HostAction, LogAction, SleepAction};
use crate::error::ActionResult;
use crate::spec::{ActionContext, ActionSpec};

/// Discriminator of internal card actions
pub const CARD_ACTION: &str = "fire-dom-event";

/// Host action kinds
pub const HOST_ACTIONS: &[&str] = &[
    "navigate",
    "url",
    "perform-action",
    "call-service",
    "more-info",
    "toggle",
    "assist",
];

/// Card action kinds delegated to the effects collaborator
pub const CARD_EFFECT_ACTIONS: &[&str] = &[
    "camera_select",
    "camera_ui",
    "clip",
    "clips",
    "default",
    "diagnostics",
    "display_mode_select",
    "download",
    "expand",
    "folder",
    "folders",
    "fullscreen",
    "image",
    "live",
    "live_substream_off",
    "live_substream_on",
    "live_substream_select",
    "media_player",
    "menu_toggle",
    "microphone_connect",
    "microphone_disconnect",
    "microphone_mute",
    "microphone_unmute",
    "mute",
    "pause",
    "play",
    "ptz",
    "ptz_digital",
    "ptz_multi",
    "recording",
    "recordings",
    "reload",
    "screenshot",
    "snapshot",
    "snapshots",
    "status_bar",
    "timeline",
    "unmute",
];

type ActionFactory = fn(&str, &Value) -> ActionResult<Box<dyn CardAction>>;

fn sleep_factory(_kind: &str, config: &Value) -> ActionResult<Box<dyn CardAction>> {
    Ok(Box::new(SleepAction::from_config(config)?))
}

fn log_factory(_kind: &str, config: &Value) -> ActionResult<Box<dyn CardAction>> {
    Ok(Box::new(LogAction::from_config(config)?))
}

fn effect_factory(kind: &str, config: &Value) -> ActionResult<Box<dyn CardAction>> {
    Ok(Box::new(EffectAction {
        kind: kind.to_string(),
        config: config.clone(),
    }))
}

fn registry() -> &'static HashMap<&'static str, ActionFactory> {
    static REGISTRY: OnceLock<HashMap<&'static str, ActionFactory>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut registry: HashMap<&'static str, ActionFactory> = HashMap::new();
        registry.insert("sleep", sleep_factory);
        registry.insert("log", log_factory);
        for kind in CARD_EFFECT_ACTIONS {
            registry.insert(*kind, effect_factory);
        }
        registry
    })
}

/// Whether `kind` is a known internal card action
pub fn is_card_action(kind: &str) -> bool {
    registry().contains_key(kind)
}

/// Compile `spec` into executable actions
///
/// Actions for another card are skipped silently. Unknown or invalid actions
/// are logged and skipped; they never abort the rest of the batch.
pub fn compile_actions(spec: &ActionSpec, context: &ActionContext) -> Vec<Box<dyn CardAction>> {
    let mut actions = Vec::new();
    compile_into(spec, context, &mut actions);
    actions
}

fn compile_into(spec: &ActionSpec, context: &ActionContext, out: &mut Vec<Box<dyn CardAction>>) {
    match spec {
        ActionSpec::Group(group) => {
            for item in group {
                compile_into(item, context, out);
            }
        }
        ActionSpec::Callback(callback) => out.push(Box::new(CallbackAction {
            callback: callback.clone(),
        })),
        ActionSpec::Config(config) => {
            if let Some(action) = compile_config(config, context) {
                out.push(action);
            }
        }
    }
}

fn compile_config(config: &Value, context: &ActionContext) -> Option<Box<dyn CardAction>> {
    if config.is_null() {
        return None;
    }
    let Some(action) = config.get("action").and_then(Value::as_str) else {
        warn!(%config, "Action without an 'action' key");
        return None;
    };

    if let Some(target_card) = config.get("card_id").and_then(Value::as_str) {
        if context.card_id.as_deref() != Some(target_card) {
            trace!(target_card, card_id = ?context.card_id, "Skipping action for another card");
            return None;
        }
    }

    if action == CARD_ACTION {
        let Some(kind) = config.get("card_action").and_then(Value::as_str) else {
            warn!(%config, "Card action without a 'card_action' kind");
            return None;
        };
        let Some(factory) = registry().get(kind) else {
            warn!(kind, "Unknown card action");
            return None;
        };
        return match factory(kind, config) {
            Ok(action) => Some(action),
            Err(e) => {
                warn!(kind, error = %e, "Invalid card action");
                None
            }
        };
    }

    if action == "none" {
        trace!("Skipping 'none' action");
        return None;
    }

    if HOST_ACTIONS.iter().any(|host| *host == action) {
        return Some(Box::new(HostAction {
            kind: action.to_string(),
            config: config.clone(),
        }));
    }

    warn!(action, "Unknown action");
    None
}
