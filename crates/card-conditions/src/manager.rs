//! Conditions manager
//!
//! The [`ConditionsManager`] owns the [`ConditionState`] for a card session (or
//! for a single automation), a list of conditions scoped to it, and the change
//! listeners interested in the result of evaluating those conditions.
//!
//! Every observable change (a real state change, a new condition set, or a
//! viewport flip) bumps a monotonically increasing version. Consumers compare
//! [`ConditionsManagerEpoch`] values to skip work when nothing changed.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use card_core::{ConditionState, StateKey};
use serde_json::Value;
use tracing::{debug, instrument, trace};
use ulid::Ulid;

use crate::condition::Condition;
use crate::discovery::collect_conditions;
use crate::eval::ConditionEvaluator;
use crate::viewport::{Viewport, ViewportWatch};

/// A unique identifier for a conditions listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Identity of a manager's observable state
///
/// Two epochs compare equal iff they come from the same manager and no
/// observable change happened in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConditionsManagerEpoch {
    pub manager_id: Ulid,
    pub version: u64,
}

/// Delivered to listeners after every observable change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionsEvaluation {
    pub epoch: ConditionsManagerEpoch,

    /// AND of the manager's scoped conditions against the current state
    pub result: bool,
}

/// Callback receiving [`ConditionsEvaluation`]s
pub type ConditionsListener = Arc<dyn Fn(&ConditionsEvaluation) + Send + Sync>;

/// Capability to evaluate conditions against the live state
///
/// Handed to UI elements the engine does not own so that they can evaluate
/// their own conditions synchronously.
pub trait EvaluateConditions: Send + Sync {
    /// AND of `conditions` against the current state, optionally with
    /// transient `state_overrides` merged on top for this call only
    fn evaluate_conditions(
        &self,
        conditions: &[Condition],
        state_overrides: Option<&ConditionState>,
    ) -> bool;
}

/// Stateful condition aggregator
pub struct ConditionsManager {
    id: Ulid,
    evaluator: ConditionEvaluator,
    state: RwLock<ConditionState>,
    conditions: RwLock<Vec<Condition>>,
    version: AtomicU64,
    next_listener_id: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, ConditionsListener)>>,
    watches: Mutex<Vec<ViewportWatch>>,
    has_telemetry: AtomicBool,
    weak_self: Weak<ConditionsManager>,
}

impl fmt::Debug for ConditionsManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionsManager")
            .field("id", &self.id)
            .field("version", &self.version.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl ConditionsManager {
    /// Create a manager with no conditions
    pub fn new(viewport: Arc<dyn Viewport>) -> Arc<Self> {
        Self::with_evaluator(ConditionEvaluator::new(viewport))
    }

    /// Create a manager sharing an existing evaluator
    pub fn with_evaluator(evaluator: ConditionEvaluator) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            id: Ulid::new(),
            evaluator,
            state: RwLock::new(ConditionState::default()),
            conditions: RwLock::new(Vec::new()),
            version: AtomicU64::new(0),
            next_listener_id: AtomicU64::new(1),
            listeners: RwLock::new(Vec::new()),
            watches: Mutex::new(Vec::new()),
            has_telemetry: AtomicBool::new(false),
            weak_self: weak_self.clone(),
        })
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn evaluator(&self) -> &ConditionEvaluator {
        &self.evaluator
    }

    /// Current epoch
    pub fn get_epoch(&self) -> ConditionsManagerEpoch {
        ConditionsManagerEpoch {
            manager_id: self.id,
            version: self.version.load(Ordering::SeqCst),
        }
    }

    /// Snapshot of the current state
    pub fn get_state(&self) -> ConditionState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Shallow-merge a partial state update
    ///
    /// When every supplied key is deep-equal to the current value this is a
    /// no-op: no listener fires and the epoch is unchanged. Otherwise all
    /// listeners fire synchronously, in registration order, before returning.
    #[instrument(skip(self, patch), fields(manager_id = %self.id, keys = ?patch.supplied_keys()))]
    pub fn set_state(&self, patch: ConditionState) {
        let changed = self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .merge(patch);

        if changed {
            self.trigger_change();
        } else {
            trace!("State unchanged");
        }
    }

    /// Clear state keys, notifying listeners if any of them was set
    pub fn clear_state(&self, keys: &[StateKey]) {
        let changed = self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear(keys);

        if changed {
            self.trigger_change();
        } else {
            trace!(?keys, "State unchanged");
        }
    }

    /// Register a listener; returns an id for [`remove_listener`](Self::remove_listener)
    pub fn add_listener(&self, listener: ConditionsListener) -> ListenerId {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::SeqCst));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// The scoped conditions
    pub fn conditions(&self) -> Vec<Condition> {
        self.conditions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the scoped conditions
    ///
    /// Recomputes telemetry dependence and recreates one viewport watcher per
    /// distinct `screen` media query (old watchers are torn down first). A
    /// different condition set mints a new epoch and notifies listeners.
    pub fn set_conditions(&self, conditions: Vec<Condition>) {
        {
            let mut current = self.conditions.write().unwrap_or_else(PoisonError::into_inner);
            if *current == conditions {
                trace!(manager_id = %self.id, "Conditions unchanged");
                return;
            }
            *current = conditions;
        }

        self.rebuild_watches();
        self.trigger_change();
    }

    /// Replace the scoped conditions with every condition found in `config`
    pub fn set_conditions_from_config(&self, config: &Value) {
        let conditions = collect_conditions(config);
        debug!(
            manager_id = %self.id,
            count = conditions.len(),
            "Setting conditions from configuration"
        );
        self.set_conditions(conditions);
    }

    /// Remove all scoped conditions and viewport watchers
    pub fn remove_conditions(&self) {
        self.set_conditions(Vec::new());
    }

    /// Whether any scoped condition reads host entity telemetry
    ///
    /// When `false`, callers may skip pumping telemetry into the manager.
    pub fn has_telemetry_conditions(&self) -> bool {
        self.has_telemetry.load(Ordering::SeqCst)
    }

    /// AND of `conditions` against the current state, with optional
    /// per-call overrides merged on top
    pub fn evaluate_conditions(
        &self,
        conditions: &[Condition],
        state_overrides: Option<&ConditionState>,
    ) -> bool {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        match state_overrides {
            Some(overrides) => {
                let merged = state.merged_with(overrides);
                drop(state);
                self.evaluator.evaluate_all(conditions, &merged)
            }
            None => self.evaluator.evaluate_all(conditions, &state),
        }
    }

    /// Evaluate the scoped conditions against the current state
    pub fn evaluate(&self) -> ConditionsEvaluation {
        let conditions = self.conditions.read().unwrap_or_else(PoisonError::into_inner);
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        ConditionsEvaluation {
            epoch: self.get_epoch(),
            result: self.evaluator.evaluate_all(&conditions, &state),
        }
    }

    /// Mint a new epoch, evaluate, and notify every listener in registration
    /// order. Listeners run without any manager lock held.
    pub fn trigger_change(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
        let evaluation = self.evaluate();

        let listeners: Vec<ConditionsListener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        trace!(
            manager_id = %self.id,
            version = evaluation.epoch.version,
            result = evaluation.result,
            listeners = listeners.len(),
            "Conditions changed"
        );
        for listener in listeners {
            listener(&evaluation);
        }
    }

    /// Detach all listeners and viewport watchers without notifying anyone
    pub fn destroy(&self) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        let watches =
            std::mem::take(&mut *self.watches.lock().unwrap_or_else(PoisonError::into_inner));
        debug!(manager_id = %self.id, watches = watches.len(), "Destroying conditions manager");
        drop(watches);
    }

    /// Number of live viewport watchers
    pub fn watch_count(&self) -> usize {
        self.watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn rebuild_watches(&self) {
        let (has_telemetry, queries) = {
            let conditions = self.conditions.read().unwrap_or_else(PoisonError::into_inner);
            let mut queries = Vec::new();
            for condition in conditions.iter() {
                condition.collect_media_queries(&mut queries);
            }
            let distinct: BTreeSet<String> = queries.into_iter().map(str::to_string).collect();
            (
                conditions.iter().any(Condition::depends_on_telemetry),
                distinct,
            )
        };
        self.has_telemetry.store(has_telemetry, Ordering::SeqCst);

        // Stale watches unsubscribe from the viewport outside the watches lock
        let stale = std::mem::take(&mut *self.watches.lock().unwrap_or_else(PoisonError::into_inner));
        drop(stale);

        let viewport = self.evaluator.viewport();
        let watches: Vec<ViewportWatch> = queries
            .iter()
            .map(|query| {
                let manager = self.weak_self.clone();
                viewport.watch(
                    query,
                    Arc::new(move || {
                        if let Some(manager) = manager.upgrade() {
                            manager.trigger_change();
                        }
                    }),
                )
            })
            .collect();

        debug!(
            manager_id = %self.id,
            has_telemetry,
            watches = watches.len(),
            "Rebuilt condition watchers"
        );
        *self.watches.lock().unwrap_or_else(PoisonError::into_inner) = watches;
    }
}

impl EvaluateConditions for ConditionsManager {
    fn evaluate_conditions(
        &self,
        conditions: &[Condition],
        state_overrides: Option<&ConditionState>,
    ) -> bool {
        ConditionsManager::evaluate_conditions(self, conditions, state_overrides)
    }
}
