//! Scripted card sessions
//!
//! A replay script is JSON lines, one step per line. Blank lines and lines
//! starting with `#` are ignored.
//!
//! ```text
//! {"step": "viewport", "width": 480, "height": 800}
//! {"step": "state", "view": "live", "fullscreen": true}
//! {"step": "clear", "keys": ["user"]}
//! {"step": "telemetry", "entities": {"binary_sensor.door": {"state": "on"}}}
//! {"step": "actions", "actions": {"action": "fire-dom-event", "card_action": "play"}}
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use card_actions::ActionSpec;
use card_conditions::SimulatedViewport;
use card_core::{ConditionState, EntityState, StateKey};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::controller::CardController;
use crate::error::{EngineError, EngineResult};

/// One step of a replay script
#[derive(Debug, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ReplayStep {
    /// A partial state update
    State(ConditionState),
    /// Remove state values
    Clear { keys: Vec<StateKey> },
    /// Entity telemetry
    Telemetry {
        entities: HashMap<String, EntityState>,
    },
    /// Resize the simulated viewport
    Viewport { width: u32, height: u32 },
    /// Run an action batch
    Actions {
        actions: ActionSpec,
        #[serde(default)]
        aux_config: Option<Value>,
    },
}

/// Parse a replay script
pub fn parse_steps(script: &str) -> EngineResult<Vec<ReplayStep>> {
    script
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|source| EngineError::ReplayStep {
                line: index + 1,
                source,
            })
        })
        .collect()
}

/// Drives a controller with replay steps
#[derive(Debug)]
pub struct ReplaySession {
    controller: Arc<CardController>,
    viewport: SimulatedViewport,
}

impl ReplaySession {
    pub fn new(controller: Arc<CardController>, viewport: SimulatedViewport) -> Self {
        Self {
            controller,
            viewport,
        }
    }

    pub fn controller(&self) -> &Arc<CardController> {
        &self.controller
    }

    /// Apply one step
    ///
    /// Action steps are awaited; automation batches they start are not.
    pub async fn apply(&self, step: ReplayStep) -> EngineResult<()> {
        match step {
            ReplayStep::State(patch) => self.controller.set_state(patch),
            ReplayStep::Clear { keys } => self.controller.clear_state(&keys),
            ReplayStep::Telemetry { entities } => {
                if !self.controller.update_telemetry(entities) {
                    debug!("Telemetry skipped");
                }
            }
            ReplayStep::Viewport { width, height } => self.viewport.resize(width, height),
            ReplayStep::Actions {
                actions,
                aux_config,
            } => self.controller.execute_actions(&actions, aux_config).await?,
        }
        Ok(())
    }
}
