//! Override compilation
//!
//! Computes the effective configuration from a base configuration and an
//! ordered list of [`OverrideRule`]s. Rules are applied in array order; when
//! rules target overlapping paths the later rule wins.

use std::sync::Arc;

use card_conditions::{Condition, EvaluateConditions};
use card_core::ConditionState;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{ConfigOverrideError, OverrideResult};
use crate::path::ConfigPath;
use crate::schema::ConfigSchema;
use crate::tree::{self, Unset};

/// Deserialize a field that can be either a single path or an array of paths
fn path_or_vec<'de, D>(deserializer: D) -> Result<Vec<ConfigPath>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PathOrVec {
        Path(ConfigPath),
        Vec(Vec<ConfigPath>),
    }

    match PathOrVec::deserialize(deserializer)? {
        PathOrVec::Path(p) => Ok(vec![p]),
        PathOrVec::Vec(v) => Ok(v),
    }
}

/// A conditional override of the base configuration
///
/// When every condition holds, `delete` is applied first, then `set`, then
/// `merge`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverrideRule {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Values to set, replacing whatever is at each path
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub set: IndexMap<ConfigPath, Value>,

    /// Values to deep-merge into whatever is at each path
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub merge: IndexMap<ConfigPath, Value>,

    /// Paths to remove
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "path_or_vec"
    )]
    pub delete: Vec<ConfigPath>,
}

impl OverrideRule {
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self {
            conditions,
            ..Default::default()
        }
    }

    pub fn with_set(mut self, path: ConfigPath, value: Value) -> Self {
        self.set.insert(path, value);
        self
    }

    pub fn with_merge(mut self, path: ConfigPath, value: Value) -> Self {
        self.merge.insert(path, value);
        self
    }

    pub fn with_delete(mut self, path: ConfigPath) -> Self {
        self.delete.push(path);
        self
    }

    /// Parse a list of rules from configuration
    pub fn parse_list(value: &Value) -> OverrideResult<Vec<OverrideRule>> {
        Ok(Vec::<OverrideRule>::deserialize(value)?)
    }
}

/// Computes effective configurations
pub struct OverrideCompiler<'a> {
    conditions: &'a dyn EvaluateConditions,
    schema: Option<&'a ConfigSchema>,
    state_overrides: Option<&'a ConditionState>,
}

impl<'a> OverrideCompiler<'a> {
    pub fn new(conditions: &'a dyn EvaluateConditions) -> Self {
        Self {
            conditions,
            schema: None,
            state_overrides: None,
        }
    }

    /// Validate the result against `schema` whenever a rule modified it
    pub fn with_schema(mut self, schema: &'a ConfigSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Evaluate rule conditions with `overrides` merged over the live state
    pub fn with_state_overrides(mut self, overrides: &'a ConditionState) -> Self {
        self.state_overrides = Some(overrides);
        self
    }

    /// Apply `rules` to `base`
    ///
    /// Returns `base` itself (the same `Arc`) when no rule modified anything.
    pub fn compile(&self, base: &Arc<Value>, rules: &[OverrideRule]) -> OverrideResult<Arc<Value>> {
        let mut config: Option<Value> = None;
        let mut holes: Vec<(Option<ConfigPath>, usize)> = Vec::new();
        let mut modified = false;

        for (index, rule) in rules.iter().enumerate() {
            if !self
                .conditions
                .evaluate_conditions(&rule.conditions, self.state_overrides)
            {
                trace!(rule = index, "Override conditions not met");
                continue;
            }

            // Copied at most once, on the first matching rule
            let config = config.get_or_insert_with(|| (**base).clone());

            for path in &rule.delete {
                match tree::unset(config, path) {
                    Unset::Missing => {}
                    Unset::Removed(_) => modified = true,
                    Unset::Hole { array, index, .. } => {
                        holes.push((array, index));
                        modified = true;
                    }
                }
            }
            for (path, value) in &rule.set {
                tree::set(config, path, value.clone());
                modified = true;
            }
            for (path, value) in &rule.merge {
                tree::merge(config, path, value.clone());
                modified = true;
            }
            debug!(
                rule = index,
                deleted = rule.delete.len(),
                set = rule.set.len(),
                merged = rule.merge.len(),
                "Applied override"
            );
        }

        let mut config = match config {
            Some(config) if modified => config,
            _ => return Ok(Arc::clone(base)),
        };

        if !holes.is_empty() {
            tree::compact_holes(&mut config, holes);
        }

        if let Some(schema) = self.schema {
            if let Err(issues) = schema.validate(&config) {
                return Err(ConfigOverrideError { issues, config }.into());
            }
        }

        Ok(Arc::new(config))
    }
}
