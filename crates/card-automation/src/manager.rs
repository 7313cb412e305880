//! Automations manager
//!
//! Every registered automation gets a private [`ConditionsManager`] scoped to
//! its own conditions. The card session's manager forwards its full state into
//! each of them, and an automation fires only when its result flips.
//!
//! A batch started while another batch of the same manager is executing
//! inherits that batch's nesting depth. Once the depth passes
//! [`MAX_NESTED_AUTOMATION_EXECUTIONS`] the batch is dropped and a single
//! error message is raised.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use card_actions::{ActionRuntime, ActionSpec};
use card_conditions::{ConditionsEvaluation, ConditionsManager, ListenerId};
use card_core::{Message, MAX_NESTED_AUTOMATION_EXECUTIONS};
use indexmap::IndexMap;
use serde_json::json;
use tokio::runtime::Handle;
use tracing::{debug, error, info, trace, warn};
use ulid::Ulid;

use crate::config::{AutomationConfig, AutomationError};

tokio::task_local! {
    static AUTOMATION_DEPTH: BatchDepth;
}

#[derive(Debug, Clone, Copy)]
struct BatchDepth {
    manager_id: Ulid,
    depth: usize,
}

/// Marks one automation batch as running until dropped, however the batch ends
struct BatchGuard {
    manager: Arc<AutomationsManager>,
}

impl BatchGuard {
    fn start(manager: Arc<AutomationsManager>) -> Self {
        manager.in_flight.fetch_add(1, Ordering::SeqCst);
        Self { manager }
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        self.manager.batch_finished();
    }
}

/// What the automations manager needs to know about the card hosting it
pub trait AutomationsHost: Send + Sync {
    /// Whether a host platform session is available
    fn has_host_session(&self) -> bool;

    /// Whether mandatory initialization has completed
    fn is_initialized(&self) -> bool;

    /// Whether an error message is currently displayed
    fn has_error_message(&self) -> bool;

    /// Display an error message
    fn set_error_message(&self, message: Message);
}

struct Automation {
    id: Ulid,
    config: AutomationConfig,
    conditions: Arc<ConditionsManager>,
    last_result: AtomicBool,
}

/// Owns the registered automations of one card
pub struct AutomationsManager {
    id: Ulid,
    source: Arc<ConditionsManager>,
    source_listener: Mutex<Option<ListenerId>>,
    runtime: Arc<ActionRuntime>,
    host: Arc<dyn AutomationsHost>,
    automations: RwLock<IndexMap<Ulid, Arc<Automation>>>,
    in_flight: AtomicUsize,
    runaway_reported: AtomicBool,
    weak_self: Weak<AutomationsManager>,
}

impl fmt::Debug for AutomationsManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutomationsManager")
            .field("id", &self.id)
            .field("automations", &self.len())
            .field("in_flight", &self.in_flight_count())
            .finish_non_exhaustive()
    }
}

impl AutomationsManager {
    /// Create a manager following the state of `source`
    pub fn new(
        source: Arc<ConditionsManager>,
        runtime: Arc<ActionRuntime>,
        host: Arc<dyn AutomationsHost>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self: &Weak<AutomationsManager>| {
            let weak = weak_self.clone();
            let listener = source.add_listener(Arc::new(move |_: &ConditionsEvaluation| {
                if let Some(manager) = weak.upgrade() {
                    manager.forward_state();
                }
            }));

            Self {
                id: Ulid::new(),
                source,
                source_listener: Mutex::new(Some(listener)),
                runtime,
                host,
                automations: RwLock::new(IndexMap::new()),
                in_flight: AtomicUsize::new(0),
                runaway_reported: AtomicBool::new(false),
                weak_self: weak_self.clone(),
            }
        })
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    /// Register automations, returning their ids in order
    ///
    /// Each automation starts from the current session state. Its initial
    /// result is recorded without firing.
    pub fn add_automations(&self, configs: Vec<AutomationConfig>) -> Vec<Ulid> {
        let state = self.source.get_state();
        let mut ids = Vec::with_capacity(configs.len());

        for config in configs {
            let conditions = ConditionsManager::with_evaluator(self.source.evaluator().clone());
            conditions.set_conditions(config.conditions.clone());
            conditions.set_state(state.clone());
            let initial = conditions.evaluate().result;

            let automation = Arc::new(Automation {
                id: Ulid::new(),
                config,
                conditions: Arc::clone(&conditions),
                last_result: AtomicBool::new(initial),
            });

            let weak_manager = self.weak_self.clone();
            let weak_automation = Arc::downgrade(&automation);
            conditions.add_listener(Arc::new(move |evaluation: &ConditionsEvaluation| {
                if let (Some(manager), Some(automation)) =
                    (weak_manager.upgrade(), weak_automation.upgrade())
                {
                    manager.handle_result(&automation, evaluation.result);
                }
            }));

            debug!(
                automation_id = %automation.id,
                tag = ?automation.config.tag,
                initial,
                "Registered automation"
            );
            ids.push(automation.id);
            self.automations
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(automation.id, automation);
        }

        if !ids.is_empty() {
            info!(count = ids.len(), "Added automations");
        }
        ids
    }

    /// Remove and destroy every automation carrying `tag`
    pub fn delete_automations(&self, tag: &str) -> usize {
        let removed: Vec<Arc<Automation>> = {
            let mut automations = self
                .automations
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let ids: Vec<Ulid> = automations
                .values()
                .filter(|automation| automation.config.tag.as_deref() == Some(tag))
                .map(|automation| automation.id)
                .collect();
            ids.iter()
                .filter_map(|id| automations.shift_remove(id))
                .collect()
        };

        for automation in &removed {
            automation.conditions.destroy();
        }
        if !removed.is_empty() {
            info!(tag, count = removed.len(), "Deleted automations");
        }
        removed.len()
    }

    /// Remove and destroy every automation
    pub fn delete_all(&self) {
        let removed = std::mem::take(
            &mut *self
                .automations
                .write()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for automation in removed.values() {
            automation.conditions.destroy();
        }
        if !removed.is_empty() {
            info!(count = removed.len(), "Deleted all automations");
        }
    }

    /// Stop following the session state and drop every automation
    pub fn destroy(&self) {
        let listener = self
            .source_listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(listener) = listener {
            self.source.remove_listener(listener);
        }
        self.delete_all();
    }

    pub fn len(&self) -> usize {
        self.automations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of automation batches currently running
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn forward_state(&self) {
        let state = self.source.get_state();
        let automations: Vec<Arc<Automation>> = self
            .automations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        for automation in automations {
            automation.conditions.set_state(state.clone());
        }
    }

    fn handle_result(&self, automation: &Automation, result: bool) {
        if automation.last_result.swap(result, Ordering::SeqCst) == result {
            trace!(automation_id = %automation.id, result, "Automation result unchanged");
            return;
        }

        if !self.host.has_host_session()
            || !self.host.is_initialized()
            || self.host.has_error_message()
        {
            debug!(automation_id = %automation.id, result, "Automation suppressed by card status");
            return;
        }

        let actions = automation.config.actions_for(result);
        if actions.is_empty() {
            return;
        }
        self.run_batch(automation, result, actions.clone());
    }

    fn run_batch(&self, automation: &Automation, result: bool, actions: ActionSpec) {
        let depth = AUTOMATION_DEPTH
            .try_with(|current| *current)
            .ok()
            .filter(|current| current.manager_id == self.id)
            .map_or(0, |current| current.depth)
            + 1;

        if depth > MAX_NESTED_AUTOMATION_EXECUTIONS {
            if !self.runaway_reported.swap(true, Ordering::SeqCst) {
                let err = AutomationError::runaway();
                error!(automation_id = %automation.id, depth, "{err}");
                self.host.set_error_message(
                    Message::error(err.to_string()).with_context(json!({
                        "automation": automation.id.to_string(),
                        "tag": automation.config.tag,
                    })),
                );
            }
            return;
        }

        let Ok(handle) = Handle::try_current() else {
            warn!(automation_id = %automation.id, "No async runtime, automation actions not run");
            return;
        };
        let Some(manager) = self.weak_self.upgrade() else {
            return;
        };

        let guard = BatchGuard::start(Arc::clone(&manager));
        let automation_id = automation.id;
        debug!(%automation_id, result, depth, "Running automation actions");

        let scope = BatchDepth {
            manager_id: self.id,
            depth,
        };
        handle.spawn(AUTOMATION_DEPTH.scope(scope, async move {
            let _guard = guard;
            if let Err(e) = manager.runtime.execute_actions(&actions, None).await {
                warn!(%automation_id, error = %e, "Automation actions failed");
            }
        }));
    }

    fn batch_finished(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.runaway_reported.store(false, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use card_actions::NoopEffects;
    use card_conditions::{Condition, SimulatedViewport};
    use card_core::{ConditionState, MessageManager};
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    struct TestHost {
        session: AtomicBool,
        messages: MessageManager,
        errors: AtomicUsize,
    }

    impl TestHost {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                session: AtomicBool::new(true),
                messages: MessageManager::new(),
                errors: AtomicUsize::new(0),
            })
        }
    }

    impl AutomationsHost for TestHost {
        fn has_host_session(&self) -> bool {
            self.session.load(Ordering::SeqCst)
        }

        fn is_initialized(&self) -> bool {
            true
        }

        fn has_error_message(&self) -> bool {
            self.messages.has_error()
        }

        fn set_error_message(&self, message: Message) {
            self.errors.fetch_add(1, Ordering::SeqCst);
            self.messages.set_message_if_higher_priority(message);
        }
    }

    fn setup(host: Arc<TestHost>) -> (Arc<ConditionsManager>, Arc<AutomationsManager>) {
        let source = ConditionsManager::new(Arc::new(SimulatedViewport::default()));
        let runtime = Arc::new(ActionRuntime::new(Arc::new(NoopEffects)));
        let manager = AutomationsManager::new(Arc::clone(&source), runtime, host);
        (source, manager)
    }

    fn counter_action(counter: &Arc<AtomicU32>) -> ActionSpec {
        let counter = Arc::clone(counter);
        ActionSpec::callback(move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_edge_triggered() {
        let (source, manager) = setup(TestHost::new());
        let fired = Arc::new(AtomicU32::new(0));
        manager.add_automations(vec![AutomationConfig::new(vec![Condition::interaction(
            false,
        )])
        .with_actions(counter_action(&fired))]);

        source.set_state(ConditionState::new().with_interaction(false));
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        source.set_state(ConditionState::new().with_view("live"));
        source.set_state(ConditionState::new().with_camera("camera.front"));
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        source.set_state(ConditionState::new().with_interaction(true));
        source.set_state(ConditionState::new().with_interaction(false));
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_actions_not() {
        let (source, manager) = setup(TestHost::new());
        let on = Arc::new(AtomicU32::new(0));
        let off = Arc::new(AtomicU32::new(0));
        manager.add_automations(vec![AutomationConfig::new(vec![Condition::view(["live"])])
            .with_actions(counter_action(&on))
            .with_actions_not(counter_action(&off))]);

        source.set_state(ConditionState::new().with_view("live"));
        source.set_state(ConditionState::new().with_view("clips"));
        settle().await;

        assert_eq!(on.load(Ordering::SeqCst), 1);
        assert_eq!(off.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_result_does_not_fire() {
        let (source, manager) = setup(TestHost::new());
        source.set_state(ConditionState::new().with_view("live"));

        let fired = Arc::new(AtomicU32::new(0));
        manager.add_automations(vec![AutomationConfig::new(vec![Condition::view(["live"])])
            .with_actions(counter_action(&fired))]);

        source.set_state(ConditionState::new().with_camera("camera.front"));
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_without_host_session() {
        let host = TestHost::new();
        host.session.store(false, Ordering::SeqCst);
        let (source, manager) = setup(Arc::clone(&host));

        let fired = Arc::new(AtomicU32::new(0));
        manager.add_automations(vec![AutomationConfig::new(vec![Condition::view(["live"])])
            .with_actions(counter_action(&fired))]);

        source.set_state(ConditionState::new().with_view("live"));
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_with_error_message() {
        let host = TestHost::new();
        host.messages
            .set_message_if_higher_priority(Message::error("Camera unavailable"));
        let (source, manager) = setup(Arc::clone(&host));

        let fired = Arc::new(AtomicU32::new(0));
        manager.add_automations(vec![AutomationConfig::new(vec![Condition::view(["live"])])
            .with_actions(counter_action(&fired))]);

        source.set_state(ConditionState::new().with_view("live"));
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runaway_automation() {
        let host = TestHost::new();
        let (source, manager) = setup(Arc::clone(&host));
        let executions = Arc::new(AtomicU32::new(0));

        let retrigger = {
            let source = Arc::downgrade(&source);
            let executions = Arc::clone(&executions);
            ActionSpec::callback(move |_| {
                let source = source.clone();
                let executions = Arc::clone(&executions);
                async move {
                    executions.fetch_add(1, Ordering::SeqCst);
                    if let Some(source) = source.upgrade() {
                        source.set_state(ConditionState::new().with_view("clips"));
                        source.set_state(ConditionState::new().with_view("live"));
                    }
                    Ok(())
                }
            })
        };
        manager.add_automations(vec![AutomationConfig::new(vec![Condition::view(["live"])])
            .with_actions(retrigger)]);

        source.set_state(ConditionState::new().with_view("live"));
        settle().await;

        assert_eq!(
            executions.load(Ordering::SeqCst),
            MAX_NESTED_AUTOMATION_EXECUTIONS as u32
        );
        assert_eq!(host.errors.load(Ordering::SeqCst), 1);
        assert!(host.messages.has_error());
        assert_eq!(manager.in_flight_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_suppressed_flip_is_recorded() {
        let host = TestHost::new();
        host.session.store(false, Ordering::SeqCst);
        let (source, manager) = setup(Arc::clone(&host));

        let fired = Arc::new(AtomicU32::new(0));
        manager.add_automations(vec![AutomationConfig::new(vec![Condition::view(["live"])])
            .with_actions(counter_action(&fired))]);

        source.set_state(ConditionState::new().with_view("live"));
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        // The session arriving later does not replay the earlier flip
        host.session.store(true, Ordering::SeqCst);
        source.set_state(ConditionState::new().with_camera("camera.front"));
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        source.set_state(ConditionState::new().with_view("clips"));
        source.set_state(ConditionState::new().with_view("live"));
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    fn switch_view(
        source: &Arc<ConditionsManager>,
        executions: &Arc<AtomicU32>,
        view: &'static str,
    ) -> ActionSpec {
        let source = Arc::downgrade(source);
        let executions = Arc::clone(executions);
        ActionSpec::callback(move |_| {
            let source = source.clone();
            let executions = Arc::clone(&executions);
            async move {
                executions.fetch_add(1, Ordering::SeqCst);
                if let Some(source) = source.upgrade() {
                    source.set_state(ConditionState::new().with_view(view));
                }
                Ok(())
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutually_triggering_automations() {
        let host = TestHost::new();
        let (source, manager) = setup(Arc::clone(&host));
        let executions = Arc::new(AtomicU32::new(0));

        manager.add_automations(vec![
            AutomationConfig::new(vec![Condition::view(["live"])])
                .with_actions(switch_view(&source, &executions, "clips")),
            AutomationConfig::new(vec![Condition::view(["clips"])])
                .with_actions(switch_view(&source, &executions, "live")),
        ]);

        source.set_state(ConditionState::new().with_view("live"));
        settle().await;

        assert_eq!(
            executions.load(Ordering::SeqCst),
            MAX_NESTED_AUTOMATION_EXECUTIONS as u32
        );
        assert_eq!(host.errors.load(Ordering::SeqCst), 1);
        assert_eq!(manager.in_flight_count(), 0);
    }

    fn explode() -> card_actions::ActionResult<()> {
        panic!("action exploded")
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_batch_is_released() {
        let (source, manager) = setup(TestHost::new());
        manager.add_automations(vec![AutomationConfig::new(vec![Condition::view(["live"])])
            .with_actions(ActionSpec::callback(|_| async { explode() }))]);

        source.set_state(ConditionState::new().with_view("live"));
        settle().await;

        assert_eq!(manager.in_flight_count(), 0);
        assert!(!manager.runaway_reported.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_delete_by_tag() {
        let (source, manager) = setup(TestHost::new());
        manager.add_automations(vec![
            AutomationConfig::new(vec![Condition::view(["live"])]).with_tag("menu"),
            AutomationConfig::new(vec![Condition::screen("(max-width: 600px)")]).with_tag("menu"),
            AutomationConfig::new(vec![Condition::view(["clips"])]).with_tag("other"),
            AutomationConfig::new(vec![Condition::view(["image"])]),
        ]);
        assert_eq!(manager.len(), 4);

        assert_eq!(manager.delete_automations("menu"), 2);
        assert_eq!(manager.len(), 2);
        assert_eq!(manager.delete_automations("menu"), 0);

        manager.destroy();
        assert!(manager.is_empty());
        assert_eq!(source.listener_count(), 0);
    }

    #[test]
    fn test_no_runtime_does_not_panic() {
        let (source, manager) = setup(TestHost::new());
        let fired = Arc::new(AtomicU32::new(0));
        manager.add_automations(vec![AutomationConfig::new(vec![Condition::view(["live"])])
            .with_actions(counter_action(&fired))]);

        source.set_state(ConditionState::new().with_view("live"));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(manager.in_flight_count(), 0);
    }
}
