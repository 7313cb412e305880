//! Action sets
//!
//! An [`ActionSet`] is one running instance of an action batch. Actions run
//! strictly in order; stopping the set interrupts the current suspension
//! point and prevents any later action from starting. Nothing is rolled back.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use ulid::Ulid;

use crate::action::CardAction;
use crate::effects::{ActionApi, ActionEffects};
use crate::error::ActionResult;
use crate::spec::ActionContext;

/// A running batch of actions
#[derive(Debug)]
pub struct ActionSet {
    id: Ulid,
    actions: Vec<Box<dyn CardAction>>,
    stop: CancellationToken,
}

impl ActionSet {
    pub fn new(actions: Vec<Box<dyn CardAction>>) -> Self {
        Self {
            id: Ulid::new(),
            actions,
            stop: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every action in order
    ///
    /// The first failing action aborts the set and its error is returned.
    pub async fn execute(
        &self,
        effects: Arc<dyn ActionEffects>,
        context: Arc<ActionContext>,
    ) -> ActionResult<()> {
        let api = ActionApi {
            effects,
            context,
            stop: self.stop.clone(),
        };

        for (index, action) in self.actions.iter().enumerate() {
            if self.stop.is_cancelled() {
                debug!(set_id = %self.id, remaining = self.actions.len() - index, "Action set stopped");
                return Ok(());
            }
            trace!(set_id = %self.id, index, kind = action.kind(), "Executing action");
            action.execute(&api).await?;
        }
        Ok(())
    }

    /// Stop the set; best-effort
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}
