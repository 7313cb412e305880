//! Action effects
//!
//! The runtime itself only knows how to sequence, delay and log. Everything
//! that changes the outside world (navigation, host service calls, media
//! control) is delegated to an [`ActionEffects`] collaborator.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::ActionResult;
use crate::spec::ActionContext;

/// Performs the side effects of host and card actions
#[async_trait]
pub trait ActionEffects: Send + Sync {
    /// Host actions: `navigate`, `url`, `perform-action`, `call-service`,
    /// `more-info`, `toggle`, `assist`
    async fn perform_host_action(
        &self,
        kind: &str,
        config: &Value,
        context: &ActionContext,
    ) -> ActionResult<()> {
        let _ = (config, context);
        debug!(kind, "Host action ignored");
        Ok(())
    }

    /// Card actions such as `camera_select`, `fullscreen` or `ptz`
    async fn perform_card_action(
        &self,
        kind: &str,
        config: &Value,
        context: &ActionContext,
    ) -> ActionResult<()> {
        let _ = (config, context);
        debug!(kind, "Card action ignored");
        Ok(())
    }
}

/// Effects that do nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEffects;

impl ActionEffects for NoopEffects {}

/// Effects that only log what would have been performed
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEffects;

#[async_trait]
impl ActionEffects for LoggingEffects {
    async fn perform_host_action(
        &self,
        kind: &str,
        config: &Value,
        context: &ActionContext,
    ) -> ActionResult<()> {
        info!(kind, card_id = ?context.card_id, %config, "Host action");
        Ok(())
    }

    async fn perform_card_action(
        &self,
        kind: &str,
        config: &Value,
        context: &ActionContext,
    ) -> ActionResult<()> {
        info!(kind, card_id = ?context.card_id, %config, "Card action");
        Ok(())
    }
}

/// What an executing action can reach
#[derive(Clone)]
pub struct ActionApi {
    pub effects: Arc<dyn ActionEffects>,
    pub context: Arc<ActionContext>,

    /// Cancelled when the owning action set is stopped
    pub stop: CancellationToken,
}

impl ActionApi {
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}
