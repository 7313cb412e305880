//! Action configuration
//!
//! Actions arrive as untyped configuration: a single action object, a list of
//! actions, or arbitrarily nested lists (each nesting level is a sequential
//! group). Internal callbacks can be mixed in programmatically.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ActionResult;

/// Shared execution context of one action batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionContext {
    /// Identifier of the card running the batch
    pub card_id: Option<String>,

    /// Extra configuration supplied by the caller of `execute_actions`
    pub aux_config: Option<Value>,
}

/// An action implemented in code rather than configuration
pub type InternalCallback =
    Arc<dyn Fn(ActionContext) -> BoxFuture<'static, ActionResult<()>> + Send + Sync>;

/// Action configuration: single, grouped, or an internal callback
#[derive(Clone)]
pub enum ActionSpec {
    /// One action object, e.g. `{"action": "navigate", ...}`
    Config(Value),
    /// A sequential group of actions
    Group(Vec<ActionSpec>),
    /// An internal callback action
    Callback(InternalCallback),
}

impl ActionSpec {
    /// Wrap an async closure as a callback action
    pub fn callback<F, Fut>(f: F) -> Self
    where
        F: Fn(ActionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult<()>> + Send + 'static,
    {
        ActionSpec::Callback(Arc::new(
            move |ctx: ActionContext| -> BoxFuture<'static, ActionResult<()>> { Box::pin(f(ctx)) },
        ))
    }

    /// Whether this spec contains no action at all
    pub fn is_empty(&self) -> bool {
        match self {
            ActionSpec::Config(value) => value.is_null(),
            ActionSpec::Group(group) => group.iter().all(ActionSpec::is_empty),
            ActionSpec::Callback(_) => false,
        }
    }
}

impl Default for ActionSpec {
    fn default() -> Self {
        ActionSpec::Group(Vec::new())
    }
}

impl From<Value> for ActionSpec {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => ActionSpec::Group(items.into_iter().map(Into::into).collect()),
            other => ActionSpec::Config(other),
        }
    }
}

impl From<Vec<ActionSpec>> for ActionSpec {
    fn from(group: Vec<ActionSpec>) -> Self {
        ActionSpec::Group(group)
    }
}

impl<'de> Deserialize<'de> for ActionSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(ActionSpec::from)
    }
}

impl fmt::Debug for ActionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionSpec::Config(value) => f.debug_tuple("Config").field(value).finish(),
            ActionSpec::Group(group) => f.debug_tuple("Group").field(group).finish(),
            ActionSpec::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// Duration specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DurationSpec {
    /// Seconds
    Seconds(f64),
    /// `SS`, `MM:SS` or `HH:MM:SS`
    Text(String),
    /// Duration components
    Components {
        #[serde(default)]
        hours: u64,
        #[serde(default)]
        minutes: u64,
        #[serde(default)]
        seconds: u64,
        #[serde(default, alias = "ms")]
        milliseconds: u64,
    },
}

impl DurationSpec {
    /// Convert to a Duration, if valid
    pub fn to_duration(&self) -> Option<Duration> {
        match self {
            DurationSpec::Seconds(secs) => Duration::try_from_secs_f64(*secs).ok(),
            DurationSpec::Text(text) => parse_duration(text),
            DurationSpec::Components {
                hours,
                minutes,
                seconds,
                milliseconds,
            } => hours
                .checked_mul(3600)?
                .checked_add(minutes.checked_mul(60)?)?
                .checked_add(*seconds)
                .map(Duration::from_secs)?
                .checked_add(Duration::from_millis(*milliseconds)),
        }
    }
}

/// Parse `SS`, `MM:SS` or `HH:MM:SS`
fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();

    if let Ok(secs) = s.parse::<f64>() {
        return Duration::try_from_secs_f64(secs).ok();
    }

    let parts: Vec<&str> = s.split(':').collect();
    match parts.len() {
        2 => {
            let mins: u64 = parts[0].parse().ok()?;
            let secs: u64 = parts[1].parse().ok()?;
            mins.checked_mul(60)?
                .checked_add(secs)
                .map(Duration::from_secs)
        }
        3 => {
            let hours: u64 = parts[0].parse().ok()?;
            let mins: u64 = parts[1].parse().ok()?;
            let secs: u64 = parts[2].parse().ok()?;
            hours
                .checked_mul(3600)?
                .checked_add(mins.checked_mul(60)?)?
                .checked_add(secs)
                .map(Duration::from_secs)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_arrays_become_groups() {
        let spec = ActionSpec::from(json!([
            {"action": "navigate", "navigation_path": "/a"},
            [{"action": "none"}, {"action": "toggle", "entity": "light.a"}]
        ]));

        match spec {
            ActionSpec::Group(items) => {
                assert_eq!(items.len(), 2);
                assert!(matches!(items[0], ActionSpec::Config(_)));
                assert!(matches!(&items[1], ActionSpec::Group(inner) if inner.len() == 2));
            }
            other => panic!("Expected Group, got {other:?}"),
        }
    }

    #[test]
    fn test_deserialize_single() {
        let spec: ActionSpec = serde_json::from_value(json!({"action": "none"})).unwrap();
        assert!(matches!(spec, ActionSpec::Config(_)));
    }

    #[test]
    fn test_is_empty() {
        assert!(ActionSpec::default().is_empty());
        assert!(ActionSpec::from(json!([[], null])).is_empty());
        assert!(!ActionSpec::from(json!({"action": "none"})).is_empty());
        assert!(!ActionSpec::callback(|_| async { Ok(()) }).is_empty());
    }

    #[test]
    fn test_duration_spec() {
        let components: DurationSpec =
            serde_json::from_value(json!({"minutes": 1, "ms": 500})).unwrap();
        assert_eq!(components.to_duration(), Some(Duration::from_millis(60_500)));

        let seconds: DurationSpec = serde_json::from_value(json!(2.5)).unwrap();
        assert_eq!(seconds.to_duration(), Some(Duration::from_millis(2500)));

        let text: DurationSpec = serde_json::from_value(json!("01:02:03")).unwrap();
        assert_eq!(text.to_duration(), Some(Duration::from_secs(3723)));

        assert_eq!(DurationSpec::Seconds(-1.0).to_duration(), None);
        assert_eq!(DurationSpec::Text("soon".into()).to_duration(), None);
    }

    #[test]
    fn test_overflowing_duration_is_invalid() {
        let components: DurationSpec =
            serde_json::from_value(json!({"hours": 6_000_000_000_000_000u64})).unwrap();
        assert_eq!(components.to_duration(), None);

        let components: DurationSpec =
            serde_json::from_value(json!({"minutes": u64::MAX})).unwrap();
        assert_eq!(components.to_duration(), None);

        let text = DurationSpec::Text("6000000000000000:00:00".into());
        assert_eq!(text.to_duration(), None);
        let text = DurationSpec::Text(format!("{}:00", u64::MAX));
        assert_eq!(text.to_duration(), None);
    }
}
