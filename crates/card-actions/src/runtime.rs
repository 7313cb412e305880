//! Action runtime
//!
//! Compiles action configuration against the card's execution context and
//! runs each batch as its own [`ActionSet`], tracking the in-flight sets so
//! that they can all be stopped on teardown.

use std::sync::{Arc, PoisonError, RwLock};

use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, info};
use ulid::Ulid;

use crate::compile::compile_actions;
use crate::effects::ActionEffects;
use crate::error::ActionResult;
use crate::set::ActionSet;
use crate::spec::{ActionContext, ActionSpec};

/// Runs action batches for one card
pub struct ActionRuntime {
    card_id: RwLock<Option<String>>,
    effects: Arc<dyn ActionEffects>,
    in_flight: DashMap<Ulid, Arc<ActionSet>>,
}

/// Removes a set from the in-flight list when its execution ends, however it ends
struct InFlightGuard<'a> {
    runtime: &'a ActionRuntime,
    id: Ulid,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.runtime.in_flight.remove(&self.id);
    }
}

impl ActionRuntime {
    pub fn new(effects: Arc<dyn ActionEffects>) -> Self {
        Self {
            card_id: RwLock::new(None),
            effects,
            in_flight: DashMap::new(),
        }
    }

    /// Set the card identifier used to skip actions for other cards
    pub fn set_card_id(&self, card_id: Option<String>) {
        *self.card_id.write().unwrap_or_else(PoisonError::into_inner) = card_id;
    }

    pub fn card_id(&self) -> Option<String> {
        self.card_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn effects(&self) -> &Arc<dyn ActionEffects> {
        &self.effects
    }

    /// Compile and run `spec` as one action set
    ///
    /// Resolves once every action has run, the set was stopped, or an action
    /// failed (in which case its error is returned).
    pub async fn execute_actions(
        &self,
        spec: &ActionSpec,
        aux_config: Option<Value>,
    ) -> ActionResult<()> {
        let context = Arc::new(ActionContext {
            card_id: self.card_id(),
            aux_config,
        });

        let actions = compile_actions(spec, &context);
        if actions.is_empty() {
            return Ok(());
        }

        let set = Arc::new(ActionSet::new(actions));
        let id = set.id();
        self.in_flight.insert(id, Arc::clone(&set));
        let _guard = InFlightGuard { runtime: self, id };

        debug!(set_id = %id, actions = set.len(), "Executing action set");
        set.execute(Arc::clone(&self.effects), context).await
    }

    /// Tell every in-flight set to stop
    pub fn stop_all(&self) {
        let sets: Vec<Arc<ActionSet>> = self
            .in_flight
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        if !sets.is_empty() {
            info!(count = sets.len(), "Stopping in-flight action sets");
        }
        for set in sets {
            set.stop();
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

impl std::fmt::Debug for ActionRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRuntime")
            .field("card_id", &self.card_id())
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::NoopEffects;
    use crate::error::ActionError;
    use serde_json::json;
    use std::time::Duration;

    fn sleep_spec(seconds: u64) -> ActionSpec {
        ActionSpec::from(json!({
            "action": "fire-dom-event",
            "card_action": "sleep",
            "duration": {"seconds": seconds}
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_tracking() {
        let runtime = Arc::new(ActionRuntime::new(Arc::new(NoopEffects)));

        let running = Arc::clone(&runtime);
        let handle =
            tokio::spawn(async move { running.execute_actions(&sleep_spec(5), None).await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(runtime.in_flight_count(), 1);

        handle.await.unwrap().unwrap();
        assert_eq!(runtime.in_flight_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_all() {
        let runtime = Arc::new(ActionRuntime::new(Arc::new(NoopEffects)));
        let mut handles = Vec::new();
        for _ in 0..3 {
            let running = Arc::clone(&runtime);
            handles.push(tokio::spawn(async move {
                running.execute_actions(&sleep_spec(3600), None).await
            }));
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(runtime.in_flight_count(), 3);

        let start = tokio::time::Instant::now();
        runtime.stop_all();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(runtime.in_flight_count(), 0);
        assert!(start.elapsed() < Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_callback_error_propagates() {
        let runtime = ActionRuntime::new(Arc::new(NoopEffects));
        let spec = ActionSpec::callback(|_| async { Err(ActionError::Callback("boom".into())) });

        let result = runtime.execute_actions(&spec, None).await;
        assert_eq!(result, Err(ActionError::Callback("boom".into())));
        assert_eq!(runtime.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_spec_is_noop() {
        let runtime = ActionRuntime::new(Arc::new(NoopEffects));
        runtime
            .execute_actions(&ActionSpec::from(json!([{"action": "none"}])), None)
            .await
            .unwrap();
        assert_eq!(runtime.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_card_id_reaches_callbacks() {
        let runtime = ActionRuntime::new(Arc::new(NoopEffects));
        runtime.set_card_id(Some("main".into()));

        let spec = ActionSpec::callback(|ctx| async move {
            match (ctx.card_id.as_deref(), ctx.aux_config) {
                (Some("main"), Some(aux)) if aux == json!({"source": "test"}) => Ok(()),
                other => Err(ActionError::Callback(format!("unexpected context {other:?}"))),
            }
        });

        runtime
            .execute_actions(&spec, Some(json!({"source": "test"})))
            .await
            .unwrap();
    }
}
